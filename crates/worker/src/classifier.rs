use quick_xml::events::Event;
use quick_xml::reader::Reader;

use broker_core::{BrokerError, BrokerResult};
use broker_domain::RequestKind;

/// 按根元素名区分获取类请求和上传类请求
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    fetch_roots: Vec<String>,
}

impl RequestClassifier {
    pub fn new(fetch_roots: Vec<String>) -> Self {
        Self { fetch_roots }
    }

    /// 根元素本地名（忽略大小写）属于获取类列表时为获取请求，其余为上传请求。
    /// 无法解析的负载返回分类错误，不会默认归为某一类。
    pub fn classify(&self, payload: &str) -> BrokerResult<RequestKind> {
        let root = root_local_name(payload)?;
        let is_fetch = self
            .fetch_roots
            .iter()
            .any(|name| name.eq_ignore_ascii_case(&root));
        Ok(if is_fetch {
            RequestKind::Fetch
        } else {
            RequestKind::Upload
        })
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(vec!["FetchEnrolmentDetails".to_string()])
    }
}

/// 读取文档根元素的本地名
pub fn root_local_name(xml: &str) -> BrokerResult<String> {
    if xml.trim().is_empty() {
        return Err(BrokerError::Classification("负载为空".to_string()));
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                return Ok(String::from_utf8_lossy(e.local_name().into_inner()).to_string());
            }
            Ok(Event::Text(_)) | Ok(Event::CData(_)) => {
                return Err(BrokerError::Classification(
                    "根元素之前出现文本内容".to_string(),
                ));
            }
            Ok(Event::Eof) => {
                return Err(BrokerError::Classification("未找到根元素".to_string()));
            }
            Err(e) => {
                return Err(BrokerError::Classification(format!("XML 解析失败: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }
}
