//! Minimal canal consumer.
//!
//! ```text
//! simple-consumer [FILTER]
//! ```
//!
//! Connects to `CANAL_ADDRESS` (default `127.0.0.1:11111`), consumes
//! `CANAL_DESTINATION` (default `example`) with the given filter (default
//! every table in every schema), logs each row change and acks each batch.
//! `CANAL_CONFIG` may point at a JSON client config instead. Ctrl-C
//! disconnects cleanly.

use std::error::Error;
use std::time::Duration;

use canal::prelude::*;

const BATCH_SIZE: i32 = 100;
const FETCH_TIMEOUT: Duration = Duration::from_secs(1);
const IDLE_SLEEP: Duration = Duration::from_secs(1);

fn connector(filter: &str) -> Result<CanalConnector, Box<dyn Error>> {
    if let Ok(path) = std::env::var("CANAL_CONFIG") {
        let json = std::fs::read_to_string(&path)?;
        let mut config: ClientConfig = CanalConnector::from_json(&json)?.config().clone();
        config.filter.get_or_insert_with(|| filter.to_string());
        return Ok(CanalConnector::from_config(config));
    }

    let env = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());
    Ok(CanalConnector::builder()
        .address(&env("CANAL_ADDRESS", "127.0.0.1:11111"))
        .destination(&env("CANAL_DESTINATION", "example"))
        .credentials(&env("CANAL_USERNAME", ""), &env("CANAL_PASSWORD", ""))
        .filter(filter)
        .build())
}

fn log_batch(batch: &Batch) -> Result<(), CanalError> {
    tracing::info!(batch_id = batch.id(), entries = batch.len(), "batch");
    for entry in batch.decode_entries()? {
        if entry.kind() != EntryType::RowData {
            continue;
        }
        let (schema, table) = entry
            .header
            .as_ref()
            .map(|h| (h.schema_name.as_str(), h.table_name.as_str()))
            .unwrap_or_default();
        let change = entry.row_change()?;
        for row in &change.row_datas {
            let columns: Vec<String> = row
                .after_columns
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect();
            tracing::info!(
                schema,
                table,
                event = ?change.kind(),
                columns = %columns.join(", "),
                "row change"
            );
        }
    }
    Ok(())
}

async fn consume(session: &mut Session) -> Result<(), CanalError> {
    loop {
        let batch = session.get_without_ack(BATCH_SIZE, Some(FETCH_TIMEOUT)).await?;
        if batch.is_no_data() || batch.is_empty() {
            tokio::time::sleep(IDLE_SLEEP).await;
            continue;
        }
        match log_batch(&batch) {
            Ok(()) => session.ack(batch.id()).await?,
            Err(e) => {
                tracing::warn!(batch_id = batch.id(), error = %e, "rolling back batch");
                session.rollback(batch.id()).await?;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let filter = std::env::args().nth(1).unwrap_or_else(|| ".*\\..*".to_string());
    let mut session = connector(&filter)?.connect().await?;

    let result = tokio::select! {
        result = consume(&mut session) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, disconnecting");
            Ok(())
        }
    };

    session.disconnect().await?;
    Ok(result?)
}
