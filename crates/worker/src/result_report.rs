//! ESIS 结果文档解析
//!
//! 失败结果被汇总为逐行文本报告，下游系统会解析这段文本，所以字段顺序和占位文字必须固定：
//!
//! ```text
//! <ObjectCategoryDescription> | No ObjectCategoryDescription
//! ObjectIdentifiers + "Key: Value" 行 | No ObjectIdentifiers
//! TransactionResultCode: <code> | No TransactionResultCode
//! TransactionResultDescription: <desc> | No TransactionResultDescription
//! OperationParameters + "Key: Value" 行 | No OperationParameters
//! ```
//!
//! 每一行都以换行符结尾。空字符串与缺失同样处理。

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use broker_core::{BrokerError, BrokerResult};

/// 结果文档中的一条 PerformanceDataMessage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerformanceDataMessage {
    pub object_category_description: Option<String>,
    pub object_identifiers: Vec<(String, String)>,
    pub transaction_result_code: Option<String>,
    pub transaction_result_description: Option<String>,
    pub operation_parameters: Vec<(String, String)>,
}

/// 上传成功结果的摘要
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuccessSummary {
    pub programme_number: String,
    pub programme_version: String,
    pub transaction_result: String,
}

impl SuccessSummary {
    pub fn render(&self) -> String {
        format!(
            "Programme Number: {}\nProgramme Version: {}\nTransaction Result: {}",
            self.programme_number, self.programme_version, self.transaction_result
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum PairList {
    Identifiers,
    Parameters,
}

struct PairBuilder {
    list: PairList,
    /// Key/Value 父元素所在的栈深度
    parent_depth: usize,
    key: String,
    value: String,
}

/// 解析文档中所有的 PerformanceDataMessage，按本地名匹配，忽略命名空间
pub fn parse_performance_messages(xml: &str) -> BrokerResult<Vec<PerformanceDataMessage>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut messages = Vec::new();
    let mut current: Option<PerformanceDataMessage> = None;
    let mut pair: Option<PairBuilder> = None;
    let mut stack: Vec<String> = Vec::new();

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = String::from_utf8_lossy(e.local_name().into_inner()).to_string();
                stack.push(local);
                match stack.last().map(String::as_str) {
                    Some("PerformanceDataMessage") => {
                        current = Some(PerformanceDataMessage::default());
                    }
                    Some("Key") | Some("Value") => open_pair(&stack, &mut pair),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => match e.local_name().into_inner() {
                b"PerformanceDataMessage" => messages.push(PerformanceDataMessage::default()),
                // 空的 Key/Value 仍然构成一对，值为空字符串
                local @ (b"Key" | b"Value") => {
                    stack.push(String::from_utf8_lossy(local).to_string());
                    open_pair(&stack, &mut pair);
                    stack.pop();
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| BrokerError::Serialization(format!("结果文档解析失败: {e}")))?;
                apply_text(&stack, &mut current, &mut pair, &text);
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(&e.clone().into_inner()).to_string();
                apply_text(&stack, &mut current, &mut pair, &text);
            }
            Ok(Event::End(_)) => {
                if pair.as_ref().is_some_and(|p| p.parent_depth == stack.len()) {
                    if let (Some(done), Some(pdm)) = (pair.take(), current.as_mut()) {
                        let entry = (done.key, done.value);
                        match done.list {
                            PairList::Identifiers => pdm.object_identifiers.push(entry),
                            PairList::Parameters => pdm.operation_parameters.push(entry),
                        }
                    }
                }
                if stack.pop().as_deref() == Some("PerformanceDataMessage") {
                    if let Some(pdm) = current.take() {
                        messages.push(pdm);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BrokerError::Serialization(format!("结果文档解析失败: {e}")));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// 栈顶为 Key 或 Value 时开始一对，已有未结束的对时不变
fn open_pair(stack: &[String], pair: &mut Option<PairBuilder>) {
    if pair.is_some() {
        return;
    }
    if let Some(list) = enclosing_pair_list(stack) {
        *pair = Some(PairBuilder {
            list,
            parent_depth: stack.len() - 1,
            key: String::new(),
            value: String::new(),
        });
    }
}

fn enclosing_pair_list(stack: &[String]) -> Option<PairList> {
    for name in stack.iter().rev().skip(1) {
        match name.as_str() {
            "ObjectIdentifiers" | "ObjectIdentifier" => return Some(PairList::Identifiers),
            "OperationParameters" | "OperationParameter" => return Some(PairList::Parameters),
            "PerformanceDataMessage" => return None,
            _ => {}
        }
    }
    None
}

fn apply_text(
    stack: &[String],
    current: &mut Option<PerformanceDataMessage>,
    pair: &mut Option<PairBuilder>,
    text: &str,
) {
    let Some(element) = stack.last() else {
        return;
    };
    if let Some(pair) = pair.as_mut() {
        match element.as_str() {
            "Key" => pair.key.push_str(text),
            "Value" => pair.value.push_str(text),
            _ => {}
        }
        return;
    }
    let Some(pdm) = current.as_mut() else {
        return;
    };
    let field = match element.as_str() {
        "ObjectCategoryDescription" => &mut pdm.object_category_description,
        "TransactionResultCode" => &mut pdm.transaction_result_code,
        "TransactionResultDescription" => &mut pdm.transaction_result_description,
        _ => return,
    };
    field.get_or_insert_with(String::new).push_str(text);
}

/// 把失败结果渲染为报告文本
pub fn render_failure_report(messages: &[PerformanceDataMessage]) -> String {
    let mut report = String::new();
    if messages.is_empty() {
        append_line(&mut report, "No PerformanceDataMessage");
        return report;
    }

    for pdm in messages {
        match non_empty(&pdm.object_category_description) {
            Some(description) => append_line(&mut report, description),
            None => append_line(&mut report, "No ObjectCategoryDescription"),
        }

        append_pairs(
            &mut report,
            "ObjectIdentifiers",
            "No ObjectIdentifiers",
            &pdm.object_identifiers,
        );

        match non_empty(&pdm.transaction_result_code) {
            Some(code) => append_line(&mut report, &format!("TransactionResultCode: {code}")),
            None => append_line(&mut report, "No TransactionResultCode"),
        }

        match non_empty(&pdm.transaction_result_description) {
            Some(description) => append_line(
                &mut report,
                &format!("TransactionResultDescription: {description}"),
            ),
            None => append_line(&mut report, "No TransactionResultDescription"),
        }

        append_pairs(
            &mut report,
            "OperationParameters",
            "No OperationParameters",
            &pdm.operation_parameters,
        );
    }
    report
}

/// 解析失败结果文档并生成报告
pub fn failure_report(xml: &str) -> BrokerResult<String> {
    let messages = parse_performance_messages(xml)?;
    Ok(render_failure_report(&messages))
}

/// 从成功结果中提取课程编号、版本和事务结果。多条记录时以最后出现的值为准。
pub fn success_summary(xml: &str) -> BrokerResult<SuccessSummary> {
    let mut summary = SuccessSummary::default();
    for pdm in parse_performance_messages(xml)? {
        for (key, value) in &pdm.object_identifiers {
            match key.to_lowercase().as_str() {
                "programme number" => summary.programme_number = value.clone(),
                "programme version number" => summary.programme_version = value.clone(),
                _ => {}
            }
        }
        if let (Some(code), Some(description)) = (
            non_empty(&pdm.transaction_result_code),
            non_empty(&pdm.transaction_result_description),
        ) {
            summary.transaction_result = format!("{code}: {description}");
        }
    }
    Ok(summary)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn append_line(report: &mut String, line: &str) {
    report.push_str(line);
    report.push('\n');
}

fn append_pairs(report: &mut String, heading: &str, placeholder: &str, pairs: &[(String, String)]) {
    if pairs.is_empty() {
        append_line(report, placeholder);
        return;
    }
    append_line(report, heading);
    for (key, value) in pairs {
        append_line(report, &format!("{key}: {value}"));
    }
}
