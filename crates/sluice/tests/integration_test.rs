//! Integration tests for sluice

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::json;
use tempfile::TempDir;

use sluice::Source;
use sluice::config::Config;
use sluice::docstore::{Document, MemoryDocumentStore};
use sluice::warehouse::{DeltaWarehouse, MemoryWarehouse, TableRef, Warehouse};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn table(source: Source) -> TableRef {
    TableRef::parse(source.table()).unwrap()
}

fn accounts(n: usize) -> Vec<serde_json::Value> {
    (0..n)
        .map(|i| {
            json!({
                "_id": {"$oid": format!("5ca4bbc7a2dd94ee58162{i:03x}")},
                "account_id": 100_000 + i,
                "limit": 10_000,
                "products": ["Derivatives", "InvestmentStock"]
            })
        })
        .collect()
}

fn transactions(n: usize) -> Vec<serde_json::Value> {
    (0..n)
        .map(|i| {
            json!({
                "account_id": 100_000 + i,
                "transaction_count": i,
                "bucket_start_date": {"$date": "1969-02-04T00:00:00Z"}
            })
        })
        .collect()
}

/// A local deployment: collection dumps, a staging bucket and a Delta
/// warehouse, each in its own directory.
struct Deployment {
    _root: TempDir,
    dumps: std::path::PathBuf,
    staging: std::path::PathBuf,
    warehouse: std::path::PathBuf,
}

impl Deployment {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        let dumps = root.path().join("dumps");
        let staging = root.path().join("staging");
        let warehouse = root.path().join("warehouse");
        for dir in [&dumps, &staging, &warehouse] {
            fs::create_dir_all(dir).unwrap();
        }
        fs::create_dir_all(dumps.join("sample_analytics")).unwrap();
        Self {
            _root: root,
            dumps,
            staging,
            warehouse,
        }
    }

    fn write_dump(&self, collection: &str, docs: &[serde_json::Value]) {
        let body: String = docs.iter().map(|d| format!("{d}\n")).collect();
        fs::write(
            self.dumps
                .join("sample_analytics")
                .join(format!("{collection}.json")),
            body,
        )
        .unwrap();
    }

    fn config(&self, extra: &str) -> Config {
        let yaml = format!(
            "storage:\n  url: {}\ndocument_store:\n  url: {}\nwarehouse:\n  url: {}\n{extra}",
            self.staging.display(),
            self.dumps.display(),
            self.warehouse.display(),
        );
        Config::parse(&yaml).unwrap()
    }

    async fn warehouse(&self) -> DeltaWarehouse {
        DeltaWarehouse::new(self.warehouse.to_str().unwrap(), HashMap::new())
            .await
            .unwrap()
    }

    fn staged(&self, rel: &str) -> std::path::PathBuf {
        self.staging.join(rel)
    }
}

fn parquet_columns(path: &Path) -> (Vec<String>, usize) {
    use deltalake::parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let builder = ParquetRecordBatchReaderBuilder::try_new(fs::File::open(path).unwrap()).unwrap();
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let rows = builder.build().unwrap().map(|b| b.unwrap().num_rows()).sum();
    (columns, rows)
}

fn memory_docs(values: Vec<serde_json::Value>) -> Vec<Document> {
    values
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

mod end_to_end_tests {
    use super::*;
    use sluice::app::run_once;

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let deployment = Deployment::new();
        deployment.write_dump("accounts", &accounts(25));
        deployment.write_dump("transactions", &transactions(7));
        let config = deployment.config("");

        for _ in 0..2 {
            let summary = run_once(&config, Some(date(2024, 3, 5)), None).await.unwrap();
            assert!(summary.is_success());

            let warehouse = deployment.warehouse().await;
            assert_eq!(warehouse.row_count(&table(Source::Account)).await.unwrap(), 25);
            assert_eq!(warehouse.row_count(&table(Source::Transaction)).await.unwrap(), 7);
        }

        for rel in [
            "raw_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account_extract.csv",
            "persist_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account.parquet",
            "raw_data/transaction/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/transaction_extract.csv",
            "persist_data/transaction/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/transaction.parquet",
        ] {
            assert!(deployment.staged(rel).is_file(), "missing {rel}");
        }
        let lease = "_leases/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/lease.json";
        assert!(!deployment.staged(lease).exists());
    }

    #[tokio::test]
    async fn test_artifact_schema_is_augmented() {
        let deployment = Deployment::new();
        deployment.write_dump(
            "accounts",
            &[json!({"A": 1, "B": "x"}), json!({"A": 2, "B": "y"})],
        );
        let config = deployment.config("");

        let summary = run_once(&config, Some(date(2024, 3, 5)), Some(Source::Account))
            .await
            .unwrap();
        assert!(summary.is_success());

        let (columns, rows) = parquet_columns(&deployment.staged(
            "persist_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account.parquet",
        ));
        assert_eq!(
            columns,
            vec!["data_date", "A", "B", "ptn_yyyy", "ptn_mm", "ptn_dd"]
        );
        assert_eq!(rows, 2);

        let csv = fs::read_to_string(deployment.staged(
            "raw_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account_extract.csv",
        ))
        .unwrap();
        assert_eq!(csv, "A,B\n1,x\n2,y\n");
    }

    #[tokio::test]
    async fn test_load_replaces_stale_rows() {
        let deployment = Deployment::new();
        deployment.write_dump("accounts", &accounts(1000));
        let config = deployment.config("");

        run_once(&config, Some(date(2024, 3, 4)), Some(Source::Account))
            .await
            .unwrap();
        let warehouse = deployment.warehouse().await;
        assert_eq!(warehouse.row_count(&table(Source::Account)).await.unwrap(), 1000);

        deployment.write_dump("accounts", &accounts(10));
        let summary = run_once(&config, Some(date(2024, 3, 5)), Some(Source::Account))
            .await
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(warehouse.row_count(&table(Source::Account)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let deployment = Deployment::new();
        deployment.write_dump("transactions", &transactions(3));
        let config = deployment.config("");

        let summary = run_once(&config, Some(date(2024, 3, 5)), None).await.unwrap();
        assert!(summary.is_success());

        let report = summary.report(Source::Account).unwrap();
        assert_eq!(report.extract.documents, 0);
        assert_eq!(report.load.rows, 0);

        let csv = fs::read(deployment.staged(
            "raw_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account_extract.csv",
        ))
        .unwrap();
        assert!(csv.is_empty());

        let (columns, rows) = parquet_columns(&deployment.staged(
            "persist_data/account/ptn_yyyy=2024/ptn_mm=3/ptn_dd=5/account.parquet",
        ));
        assert_eq!(columns, vec!["data_date", "ptn_yyyy", "ptn_mm", "ptn_dd"]);
        assert_eq!(rows, 0);

        let warehouse = deployment.warehouse().await;
        assert_eq!(warehouse.row_count(&table(Source::Account)).await.unwrap(), 0);
        assert_eq!(warehouse.row_count(&table(Source::Transaction)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_abort_and_continue_policies() {
        let deployment = Deployment::new();
        deployment.write_dump("accounts", &accounts(4));
        let continue_config = deployment.config("transform:\n  on_failure: continue\n");
        let abort_config = deployment.config("");

        let summary = run_once(&continue_config, Some(date(2024, 3, 5)), Some(Source::Account))
            .await
            .unwrap();
        assert!(summary.is_success());

        // A field that collides with a provenance column breaks the transform.
        deployment.write_dump("accounts", &[json!({"account_id": 1, "ptn_dd": 9})]);

        let summary = run_once(&abort_config, Some(date(2024, 3, 5)), Some(Source::Account))
            .await
            .unwrap();
        assert!(!summary.is_success());
        assert_eq!(
            summary.failed().collect::<Vec<_>>(),
            vec![Source::Account]
        );

        let summary = run_once(&continue_config, Some(date(2024, 3, 5)), Some(Source::Account))
            .await
            .unwrap();
        assert!(summary.is_success());
        let report = summary.report(Source::Account).unwrap();
        assert!(report.transform.is_none());
        assert_eq!(report.load.rows, 4);
    }
}

mod chain_independence_tests {
    use super::*;
    use sluice::pipeline::{ChainState, Pipeline, RunContext};
    use sluice::{FixedClock, StorageProvider};
    use sluice_core::ChainOutcome;

    #[tokio::test]
    async fn test_account_failure_leaves_transactions_loaded() {
        let dir = TempDir::new().unwrap();
        let storage = StorageProvider::shared(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap();
        let store = Arc::new(
            MemoryDocumentStore::new()
                .with_collection("accounts", memory_docs(accounts(3)))
                .with_collection("transactions", memory_docs(transactions(5))),
        );
        store.fail_collection("accounts", "connection refused");
        let warehouse = Arc::new(MemoryWarehouse::new());

        let pipeline = Pipeline::new(store.clone(), storage, warehouse.clone());
        let ctx = RunContext::new(Arc::new(FixedClock::new(date(2024, 3, 5))));
        let summary = pipeline.run(&ctx).await;

        assert!(!summary.is_success());
        match summary.outcome(Source::Account).unwrap() {
            ChainOutcome::Failed(e) => {
                assert_eq!(e.failed_state(), ChainState::Extracting);
                assert!(e.to_string().contains("connection refused"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(summary.outcome(Source::Transaction).unwrap().is_completed());
        assert_eq!(warehouse.row_count(&table(Source::Transaction)).await.unwrap(), 5);
        assert!(warehouse.row_count(&table(Source::Account)).await.is_err());

        store.heal_collection("accounts");
        let summary = pipeline.run(&ctx).await;
        assert!(summary.is_success());
        assert_eq!(warehouse.row_count(&table(Source::Account)).await.unwrap(), 3);
    }
}

mod lease_tests {
    use super::*;
    use sluice::paths::ArtifactPaths;
    use sluice::{PartitionKey, StorageProvider};
    use sluice_core::{LeaseError, PartitionLease};
    use std::time::Duration;

    #[tokio::test]
    async fn test_partition_lease_exclusivity() {
        let dir = TempDir::new().unwrap();
        let storage = StorageProvider::shared(dir.path().to_str().unwrap(), HashMap::new())
            .await
            .unwrap();
        let key = PartitionKey::from_date(date(2024, 3, 5));
        let path = ArtifactPaths::new(Source::Account, &key).lease;

        let leases = PartitionLease::new(storage.clone(), Duration::from_secs(3600));
        let first = leases.acquire(path.clone(), "run-1").await.unwrap();
        assert!(matches!(
            leases.acquire(path.clone(), "run-2").await,
            Err(LeaseError::Held { .. })
        ));

        // Other partitions are unaffected.
        let other = ArtifactPaths::new(Source::Transaction, &key).lease;
        leases.acquire(other, "run-2").await.unwrap();

        first.release().await.unwrap();
        leases.acquire(path.clone(), "run-2").await.unwrap();

        // With a zero TTL every existing lease counts as abandoned.
        let impatient = PartitionLease::new(storage, Duration::ZERO);
        let taken = impatient.acquire(path, "run-3").await.unwrap();
        assert_eq!(taken.record().owner, "run-3");
    }
}

mod schedule_tests {
    use chrono::{Local, NaiveTime, TimeZone};
    use sluice::schedule::DailySchedule;

    #[test]
    fn test_next_fire_time() {
        let schedule = DailySchedule::new(NaiveTime::from_hms_opt(21, 0, 0).unwrap());

        let morning = Local.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap();
        assert_eq!(
            schedule.next_after(&morning),
            Local.with_ymd_and_hms(2024, 6, 5, 21, 0, 0).unwrap()
        );

        let late = Local.with_ymd_and_hms(2024, 6, 5, 21, 30, 0).unwrap();
        assert_eq!(
            schedule.next_after(&late),
            Local.with_ymd_and_hms(2024, 6, 6, 21, 0, 0).unwrap()
        );
    }
}

mod config_tests {
    use super::*;
    use sluice::config::{DataDateSource, ParquetCompression, TransformFailurePolicy};

    #[test]
    fn test_config_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sluice.yaml");
        fs::write(
            &path,
            r#"
storage:
  url: gs://etl-staging/sluice
  options:
    google_service_account: /secrets/sa.json
document_store:
  url: gs://etl-dumps
  database: sample_analytics
warehouse:
  kind: delta
  url: gs://etl-warehouse
transform:
  compression: zstd
  data_date: wall_clock
  on_failure: continue
schedule:
  daily_at: "21:00"
lease:
  ttl_secs: 3600
metrics:
  address: 0.0.0.0:9090
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage.url, "gs://etl-staging/sluice");
        assert_eq!(config.transform.compression, ParquetCompression::Zstd);
        assert_eq!(config.transform.data_date, DataDateSource::WallClock);
        assert_eq!(config.transform.on_failure, TransformFailurePolicy::Continue);
        assert_eq!(config.lease.ttl().as_secs(), 3600);
        assert_eq!(config.metrics.address.as_deref(), Some("0.0.0.0:9090"));
    }
}
