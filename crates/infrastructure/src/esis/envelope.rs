//! SOAP 1.1 报文的构造与解析
//!
//! 请求体中的业务负载按原样嵌入；响应只按本地名匹配元素，不依赖命名空间前缀。

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::warn;
use uuid::Uuid;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::{MessageHeaders, PullResult, PullStatusCode, ResultPayload};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// ESIS 服务的四个操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsisOperation {
    UploadLearnerEventData,
    FetchLearnerEventData,
    GetLearnerEventResults,
    FetchLearnerEventDataResults,
}

impl EsisOperation {
    pub fn name(&self) -> &'static str {
        match self {
            EsisOperation::UploadLearnerEventData => "UploadLearnerEventData",
            EsisOperation::FetchLearnerEventData => "FetchLearnerEventData",
            EsisOperation::GetLearnerEventResults => "GetLearnerEventResults",
            EsisOperation::FetchLearnerEventDataResults => "FetchLearnerEventDataResults",
        }
    }
}

/// 按服务命名空间构造请求报文
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    namespace: String,
}

impl EnvelopeBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn upload_learner_event_data(&self, headers: &MessageHeaders, payload: &str) -> String {
        let body = format!(
            "<ns:UploadLearnerEventData><ns:EventDataMessage><ns:TertiaryPerformanceData>{}</ns:TertiaryPerformanceData></ns:EventDataMessage></ns:UploadLearnerEventData>",
            strip_declaration(payload)
        );
        self.wrap(headers, &body)
    }

    pub fn fetch_learner_event_data(&self, headers: &MessageHeaders, payload: &str) -> String {
        let body = format!(
            "<ns:FetchLearnerEventData><ns:FetchEventDataMessage><ns:FetchTertiaryPerformanceData>{}</ns:FetchTertiaryPerformanceData></ns:FetchEventDataMessage></ns:FetchLearnerEventData>",
            strip_declaration(payload)
        );
        self.wrap(headers, &body)
    }

    pub fn get_learner_event_results(&self, headers: &MessageHeaders, ids: &[Uuid]) -> String {
        let list: String = ids
            .iter()
            .map(|id| format!("<ns:MessageId>{id}</ns:MessageId>"))
            .collect();
        let body = format!(
            "<ns:GetLearnerEventResults><ns:MessageIdList>{list}</ns:MessageIdList></ns:GetLearnerEventResults>"
        );
        self.wrap(headers, &body)
    }

    pub fn fetch_learner_event_data_results(&self, headers: &MessageHeaders, id: Uuid) -> String {
        let body = format!(
            "<ns:FetchLearnerEventDataResults><ns:MessageId>{id}</ns:MessageId></ns:FetchLearnerEventDataResults>"
        );
        self.wrap(headers, &body)
    }

    fn wrap(&self, headers: &MessageHeaders, body: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<soap:Envelope xmlns:soap="{soap}" xmlns:ns="{ns}">"#,
                "<soap:Header><ns:MessageHeaders>",
                "<ns:EsaaUsername>{user}</ns:EsaaUsername>",
                "<ns:EsaaPassword>{password}</ns:EsaaPassword>",
                "<ns:ProviderNumber>{provider}</ns:ProviderNumber>",
                "<ns:TMSUsername>{tms}</ns:TMSUsername>",
                "</ns:MessageHeaders></soap:Header>",
                "<soap:Body>{body}</soap:Body>",
                "</soap:Envelope>"
            ),
            soap = SOAP_ENV_NS,
            ns = escape(self.namespace.as_str()),
            user = escape(headers.esaa_username.as_str()),
            password = escape(headers.esaa_password.as_str()),
            provider = escape(headers.provider_number.as_str()),
            tms = escape(headers.tms_username.as_str()),
            body = body,
        )
    }
}

/// 去掉负载开头的 XML 声明，使其可以嵌入报文
fn strip_declaration(payload: &str) -> &str {
    let trimmed = payload.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with("<?xml") {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}

fn xml_error(error: quick_xml::Error) -> BrokerError {
    BrokerError::external(format!("无法解析 ESIS 响应: {error}"))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().into_inner()).to_string()
}

/// 响应为 SOAP Fault 时返回外部服务错误
pub fn check_fault(xml: &str) -> BrokerResult<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_fault = false;
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match local_name(&e).as_str() {
                "Fault" => in_fault = true,
                "faultstring" if in_fault => {
                    let text = reader.read_text(e.name()).map_err(xml_error)?;
                    return Err(BrokerError::external(format!(
                        "ESIS 返回 SOAP Fault: {}",
                        text.trim()
                    )));
                }
                _ => {}
            },
            Event::Empty(e) if local_name(&e) == "Fault" => {
                return Err(BrokerError::external("ESIS 返回 SOAP Fault"));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if in_fault {
        return Err(BrokerError::external("ESIS 返回 SOAP Fault"));
    }
    Ok(())
}

/// 推送响应中的消息ID，原样返回由调用方校验格式
pub fn parse_push_response(xml: &str) -> BrokerResult<String> {
    check_fault(xml)?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) if local_name(&e) == "MessageId" => {
                let text = reader.read_text(e.name()).map_err(xml_error)?;
                return Ok(text.trim().to_string());
            }
            Event::Empty(e) if local_name(&e) == "MessageId" => return Ok(String::new()),
            Event::Eof => break,
            _ => {}
        }
    }
    Err(BrokerError::external("ESIS 推送响应中缺少 MessageId"))
}

/// 批量查询上传结果的响应
///
/// 缺少或无法解析 MessageId 的条目无法对应到任何消息，记录后跳过，其余条目照常返回。
pub fn parse_upload_results(xml: &str) -> BrokerResult<Vec<PullResult>> {
    check_fault(xml)?;

    let mut results = Vec::new();
    for entry in parse_result_entries(xml, "LearnerEventResult", "ITRResult")? {
        let Some(raw_id) = entry.message_id else {
            warn!("ESIS 上传结果缺少 MessageId，已跳过该条目");
            continue;
        };
        let Ok(correlation_id) = Uuid::parse_str(raw_id.trim()) else {
            warn!(
                raw_message_id = %raw_id,
                "ESIS 上传结果的 MessageId 不是 GUID 格式，已跳过该条目"
            );
            continue;
        };
        results.push(PullResult {
            correlation_id,
            status_code: PullStatusCode::parse(entry.status_code.as_deref().unwrap_or("")),
            result: entry.payload,
        });
    }
    Ok(results)
}

/// 单条获取类结果的响应
pub fn parse_fetch_result(xml: &str, correlation_id: Uuid) -> BrokerResult<PullResult> {
    check_fault(xml)?;

    let entry = parse_result_entries(xml, "FetchLearnerEventDataResult", "LearnerEventDataResult")?
        .into_iter()
        .next()
        .ok_or_else(|| BrokerError::external("ESIS 获取结果响应中缺少结果"))?;

    Ok(PullResult {
        correlation_id,
        status_code: PullStatusCode::parse(entry.status_code.as_deref().unwrap_or("")),
        result: entry.payload,
    })
}

#[derive(Debug, Default)]
struct ResultEntry {
    message_id: Option<String>,
    status_code: Option<String>,
    payload: Option<ResultPayload>,
}

/// 读取结果条目。结果容器内的第一个子元素连同标签一起作为结果文档保留。
fn parse_result_entries(
    xml: &str,
    entry_name: &str,
    container_name: &str,
) -> BrokerResult<Vec<ResultEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ResultEntry> = None;
    let mut in_container = false;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = local_name(&e);
                if current.is_none() {
                    if name == entry_name {
                        current = Some(ResultEntry::default());
                    }
                    continue;
                }
                let Some(entry) = current.as_mut() else {
                    continue;
                };

                if in_container {
                    reader.read_to_end(e.name()).map_err(xml_error)?;
                    let after = reader.buffer_position() as usize;
                    if entry.payload.is_none() {
                        entry.payload = Some(ResultPayload {
                            local_name: name,
                            xml: xml[before..after].trim().to_string(),
                        });
                    }
                } else if name == container_name {
                    in_container = true;
                } else if name == "MessageId" {
                    let text = reader.read_text(e.name()).map_err(xml_error)?;
                    entry.message_id = Some(text.trim().to_string());
                } else if name == "StatusCode" {
                    let text = reader.read_text(e.name()).map_err(xml_error)?;
                    entry.status_code = Some(text.trim().to_string());
                }
            }
            Event::Empty(e) => {
                if let Some(entry) = current.as_mut() {
                    if in_container && entry.payload.is_none() {
                        let after = reader.buffer_position() as usize;
                        entry.payload = Some(ResultPayload {
                            local_name: local_name(&e),
                            xml: xml[before..after].trim().to_string(),
                        });
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                if name == container_name {
                    in_container = false;
                } else if name == entry_name {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(entries)
}
