//! Journal workload run inside the crash child process
//!
//! Touches every crash point in order:
//!
//! ```text
//! SENDING 1, SENDING 2        append points
//! DELIVERED 1                 segment 0 still holds message 2
//! NOT_DELIVERED 2             segment 0 idle: rotate, then delete it
//! SENDING 3                   lands in segment 1
//! ```

use std::path::PathBuf;

use courier::journal::{RecordType, RetryPolicy};
use serde_json::json;

use super::harness::CRASH_DIR_ENV;
use crate::common::{journal_config, open_journal};

#[tokio::test]
#[ignore = "driven by the crash harness in a child process"]
async fn journal_workload() {
    let Some(dir) = std::env::var_os(CRASH_DIR_ENV).map(PathBuf::from) else {
        return;
    };

    let config = journal_config(&dir, 0, 1000).with_retry(RetryPolicy::no_retry());
    let (journal, _) = open_journal(&config).await;

    journal.write(1, RecordType::Sending, Some(json!({"n": 1}))).await.unwrap();
    journal.write(2, RecordType::Sending, Some(json!({"n": 2}))).await.unwrap();
    journal.write(1, RecordType::Delivered, None).await.unwrap();
    journal.write(2, RecordType::NotDelivered, None).await.unwrap();
    journal.write(3, RecordType::Sending, Some(json!({"n": 3}))).await.unwrap();

    journal.close().await.unwrap();
}
