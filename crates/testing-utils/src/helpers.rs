//! Test helper utilities and sample documents

use std::time::Duration;
use tokio::time::sleep;

use broker_domain::MessageHeaders;

/// A complete set of ESIS message headers
pub fn sample_headers() -> MessageHeaders {
    MessageHeaders {
        esaa_username: "esaa-user".to_string(),
        esaa_password: "esaa-password".to_string(),
        provider_number: "7001".to_string(),
        tms_username: "tms-user".to_string(),
    }
}

pub const FETCH_REQUEST: &str =
    r#"<FetchEnrolmentDetails xmlns="http://www.esis.govt.nz/itr"><NSN>123456789</NSN></FetchEnrolmentDetails>"#;

pub const UPLOAD_REQUEST: &str =
    r#"<UploadLearnerEvent xmlns="http://www.esis.govt.nz/itr"><NSN>123456789</NSN></UploadLearnerEvent>"#;

pub const SUCCESS_RESULT: &str = r#"<Success xmlns="http://www.esis.govt.nz/itr">
  <PerformanceDataMessage>
    <ObjectIdentifiers>
      <ObjectIdentifier><Key>Programme Number</Key><Value>PR1234</Value></ObjectIdentifier>
      <ObjectIdentifier><Key>Programme Version Number</Key><Value>2</Value></ObjectIdentifier>
    </ObjectIdentifiers>
    <TransactionResultCode>0</TransactionResultCode>
    <TransactionResultDescription>Accepted</TransactionResultDescription>
  </PerformanceDataMessage>
</Success>"#;

pub const FETCH_RESULT: &str = r#"<EnrolmentDetails xmlns="http://www.esis.govt.nz/itr">
  <Enrolment><NSN>123456789</NSN><Status>Active</Status></Enrolment>
</EnrolmentDetails>"#;

pub const FAILURE_RESULT: &str = r#"<Failure xmlns="http://www.esis.govt.nz/itr">
  <PerformanceDataMessage>
    <ObjectCategoryDescription>Learner</ObjectCategoryDescription>
    <ObjectIdentifiers>
      <ObjectIdentifier><Key>NSN</Key><Value>123456789</Value></ObjectIdentifier>
    </ObjectIdentifiers>
    <TransactionResultCode>E101</TransactionResultCode>
    <TransactionResultDescription>Learner not found</TransactionResultDescription>
  </PerformanceDataMessage>
</Failure>"#;

/// Wait for a condition to be true with timeout
pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }

    false
}
