//! ESIS 服务适配
//!
//! SOAP 报文的构造与解析，以及实现 `EsisService` 的 HTTP 客户端。

pub mod envelope;
pub mod soap_client;

pub use envelope::{EnvelopeBuilder, EsisOperation};
pub use soap_client::EsisSoapClient;
