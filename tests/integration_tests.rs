use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use transport_resample::codec;
use transport_resample::config::{ResampleSettings, TaskConfig, TaskRegistry};
use transport_resample::error::{StoreError, TaskError};
use transport_resample::naming::TlcFileNamer;
use transport_resample::store::{MemoryStore, ObjectStore};
use transport_resample::tasks::{self, WorkUnit};

const REGISTRY: &str = r#"{
    "resample": { "weekday": 2, "frequency": "1M" },
    "tasks": {
        "rs-transit": {
            "input": "cl-transit",
            "output": "rs-transit",
            "dtypes": { "STATION": "object", "DATE": "object", "ENTRIES": "int64" },
            "date_columns": ["DATE"],
            "diff": { "compute": true, "columns": ["ENTRIES"], "derived_columns": ["ENTRIES_DIFF"] },
            "group": { "compute": true, "by_columns": ["STATION"] },
            "aggregation": "sum",
            "index_column": "DATE"
        },
        "rs-ycabs": {
            "input": "cl-ycabs",
            "output": "rs-ycabs",
            "dtypes": { "tpep_pickup_datetime": "datetime64", "passenger_count": "int64" },
            "date_columns": ["tpep_pickup_datetime"],
            "aggregation": "sum",
            "index_column": "tpep_pickup_datetime"
        },
        "rs-gcabs": {
            "input": "cl-gcabs",
            "output": "rs-gcabs",
            "dtypes": {
                "lpep_pickup_datetime": "datetime64",
                "passenger_count": "int64",
                "total_amount": "float64"
            },
            "date_columns": ["lpep_pickup_datetime"],
            "aggregation": "sum",
            "index_column": "lpep_pickup_datetime"
        },
        "rs-traffic": {
            "input": "cl-traffic",
            "output": "rs-traffic",
            "dtypes": {
                "segment": "object",
                "recorded_at": "datetime64",
                "updated_at": "datetime64",
                "speed": "float64"
            },
            "date_columns": ["recorded_at", "updated_at"],
            "group": { "compute": true, "by_columns": ["segment"] },
            "aggregation": "last",
            "index_column": "recorded_at"
        },
        "rg-transit": {
            "input": "rs-transit-all",
            "output": "rg-transit",
            "split_by": ["STATION"]
        }
    }
}"#;

fn registry() -> TaskRegistry {
    TaskRegistry::from_json(REGISTRY).expect("registry parses")
}

fn config(task_type: &str) -> TaskConfig {
    registry().resolve(task_type).expect("task configured")
}

fn text(store: &MemoryStore, container: &str, key: &str) -> String {
    let body = store.get(container, key).unwrap_or_else(|| panic!("{key} written"));
    String::from_utf8(body.to_vec()).unwrap()
}

/// Turnstile file with one station whose counter climbs by 2, 4, 6, 8.
fn turnstile_day(date: &str) -> String {
    let mut out = String::from("C/A, UNIT, SCP, STATION, DATE, TIME, ENTRIES\n");
    let mut counter = 1000;
    for (i, step) in [0, 2, 4, 6, 8].iter().enumerate() {
        counter += step;
        out.push_str(&format!(
            "A002, R051, 02-00-00, 59 ST, {date}, {:02}:00:00, {counter}\n",
            i * 4
        ));
    }
    out
}

#[tokio::test]
async fn test_missing_days_are_skipped() {
    let store = MemoryStore::new();
    for day in 1..=28 {
        store.insert(
            "cl-transit",
            &format!("turnstile_202102{day:02}.txt"),
            turnstile_day(&format!("02/{day:02}/2021")),
        );
    }
    let settings = registry().settings().clone();

    let summary = tasks::perform(
        &store,
        &config("rs-transit"),
        &settings,
        &TlcFileNamer,
        &WorkUnit::Token("2021-02".into()),
    )
    .await
    .unwrap();

    assert_eq!(summary.files_processed, 28);
    assert_eq!(summary.files_skipped, 3);
    assert_eq!(store.keys("rs-transit").len(), 28);

    // 2021-02-03 is a Wednesday; 2021-02-04 is not
    assert_eq!(
        text(&store, "rs-transit", "turnstile_20210203.txt"),
        "DATE,STATION,ENTRIES_DIFF\n2021-02-28,59 ST,20.0\n"
    );
    assert_eq!(
        text(&store, "rs-transit", "turnstile_20210204.txt"),
        "DATE,STATION,ENTRIES_DIFF\n"
    );
}

#[tokio::test]
async fn test_two_months_resample_to_two_rows() {
    let store = MemoryStore::new();
    let mut csv = String::from("VendorID,tpep_pickup_datetime,passenger_count\n");
    for (month, days) in [(1, 31), (2, 28)] {
        for day in 1..=days {
            csv.push_str(&format!("2,2021-{month:02}-{day:02} 08:00:00,{day}\n"));
        }
    }
    store.insert("cl-ycabs", "yellow_tripdata_2021-01.csv", csv);

    let summary = tasks::perform(
        &store,
        &config("rs-ycabs"),
        &ResampleSettings::default(),
        &TlcFileNamer,
        &WorkUnit::Token("2021-01".into()),
    )
    .await
    .unwrap();

    assert_eq!(summary.files_processed, 1);
    // Wednesdays: Jan 6+13+20+27, Feb 3+10+17+24
    assert_eq!(
        text(&store, "rs-ycabs", "yellow_tripdata_2021-01.csv"),
        "tpep_pickup_datetime,passenger_count\n2021-01-31,66\n2021-02-28,54\n"
    );
}

#[tokio::test]
async fn test_parse_failure_aborts_but_keeps_earlier_outputs() {
    let store = MemoryStore::new();
    store.insert("cl-transit", "turnstile_20210301.txt", turnstile_day("03/01/2021"));
    store.insert(
        "cl-transit",
        "turnstile_20210302.txt",
        "STATION,DATE,ENTRIES\n59 ST,03/02/2021,lots\n",
    );

    let err = tasks::perform(
        &store,
        &config("rs-transit"),
        &ResampleSettings::default(),
        &TlcFileNamer,
        &WorkUnit::Token("2021-03".into()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TaskError::Transform(_)));
    assert!(store.get("rs-transit", "turnstile_20210301.txt").is_some());
    assert!(store.get("rs-transit", "turnstile_20210302.txt").is_none());
}

/// Delegates to a [`MemoryStore`] but fails reads of one key.
struct FlakyStore {
    inner: MemoryStore,
    broken_key: &'static str,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn create_container(&self, container: &str) -> Result<(), StoreError> {
        self.inner.create_container(container).await
    }

    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list_objects(container, prefix).await
    }

    async fn read_object(&self, container: &str, key: &str) -> Result<Bytes, StoreError> {
        if key == self.broken_key {
            return Err(StoreError::backend(container, key, anyhow::anyhow!("connection reset")));
        }
        self.inner.read_object(container, key).await
    }

    async fn write_object(&self, container: &str, key: &str, body: Bytes) -> Result<(), StoreError> {
        self.inner.write_object(container, key, body).await
    }
}

#[tokio::test]
async fn test_store_errors_other_than_not_found_abort() {
    let store = FlakyStore {
        inner: MemoryStore::new(),
        broken_key: "turnstile_20210305.txt",
    };
    store
        .inner
        .insert("cl-transit", "turnstile_20210301.txt", turnstile_day("03/01/2021"));

    let err = tasks::perform(
        &store,
        &config("rs-transit"),
        &ResampleSettings::default(),
        &TlcFileNamer,
        &WorkUnit::Token("2021-03".into()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TaskError::Store(StoreError::Backend { .. })));
    assert_eq!(store.inner.keys("rs-transit"), vec!["turnstile_20210301.txt"]);
}

#[tokio::test]
async fn test_gzip_input_and_output() {
    let store = MemoryStore::new();
    let packed = codec::encode(turnstile_day("02/03/2021").into_bytes(), true).unwrap();
    store.insert("cl-transit", "turnstile_20210203.txt.gz", packed);

    let settings = ResampleSettings {
        gzip: true,
        ..ResampleSettings::default()
    };
    tasks::perform(
        &store,
        &config("rs-transit"),
        &settings,
        &TlcFileNamer,
        &WorkUnit::Files(vec!["turnstile_20210203.txt.gz".into()]),
    )
    .await
    .unwrap();

    let out = store.get("rs-transit", "turnstile_20210203.txt.gz").unwrap();
    let plain = codec::decode("turnstile_20210203.txt.gz", out).unwrap();
    assert_eq!(
        String::from_utf8(plain.to_vec()).unwrap(),
        "DATE,STATION,ENTRIES_DIFF\n2021-02-28,59 ST,20.0\n"
    );
}

/// Two stations per day from Jan 1 to Feb 28 sharing one climbing counter,
/// with a counter reset partway through January.
fn year_rows() -> Vec<String> {
    let mut rows = Vec::new();
    let mut counter = 500i64;
    let mut i = 0;
    for (month, days) in [(1, 31), (2, 28)] {
        for day in 1..=days {
            for station in ["A", "B"] {
                counter = if i == 30 { 3 } else { counter + 1 + (i % 4) };
                rows.push(format!("{station},{month:02}/{day:02}/2021,{counter}"));
                i += 1;
            }
        }
    }
    rows
}

fn with_header(rows: &[String]) -> String {
    let mut out = String::from("STATION,DATE,ENTRIES\n");
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    out
}

#[tokio::test]
async fn test_bulk_matches_single_file_over_concatenation() {
    let rows = year_rows();
    let memory = Arc::new(MemoryStore::new());
    memory.insert("cl-transit", "all.txt", with_header(&rows));
    memory.insert("cl-transit", "2021/part_0.txt", with_header(&rows[..50]));
    memory.insert("cl-transit", "2021/part_1.txt", with_header(&[]));
    memory.insert("cl-transit", "2021/part_2.txt", with_header(&rows[50..]));

    let config = config("rs-transit");
    let settings = ResampleSettings {
        concurrency: 2,
        ..ResampleSettings::default()
    };

    tasks::perform(
        memory.as_ref(),
        &config,
        &settings,
        &TlcFileNamer,
        &WorkUnit::Files(vec!["all.txt".into()]),
    )
    .await
    .unwrap();

    let store: Arc<dyn ObjectStore> = memory.clone();
    let summary = tasks::perform_bulk(store, &config, &settings, &["2021".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.files_processed, 3);
    assert_eq!(summary.objects_written, 2);

    let single = text(&memory, "rs-transit", "all.txt");
    let mut single_lines = single.lines();
    let header = single_lines.next().unwrap();

    let mut bulk_lines = Vec::new();
    for key in ["2021/transit_0.csv", "2021/transit_1.csv"] {
        let body = text(&memory, "rs-transit", key);
        let mut lines = body.lines();
        assert_eq!(lines.next().unwrap(), header);
        bulk_lines.extend(lines.map(str::to_string));
    }

    let single_lines: Vec<String> = single_lines.map(str::to_string).collect();
    assert_eq!(single_lines.len(), 4);
    assert_eq!(bulk_lines, single_lines);
}

#[tokio::test]
async fn test_bulk_matches_partition_columns_by_name() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert(
        "cl-gcabs",
        "2021/a.csv",
        "VendorID,lpep_pickup_datetime,passenger_count,total_amount\n2,2021-01-06 08:00:00,1,10.5\n",
    );
    memory.insert(
        "cl-gcabs",
        "2021/b.csv",
        "total_amount,passenger_count,lpep_pickup_datetime,VendorID\n20.5,2,2021-01-13T09:00:00.000,1\n",
    );

    let store: Arc<dyn ObjectStore> = memory.clone();
    let summary = tasks::perform_bulk(
        store,
        &config("rs-gcabs"),
        &ResampleSettings::default(),
        &["2021".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(summary.objects_written, 1);
    assert_eq!(
        text(&memory, "rs-gcabs", "2021/gcabs_0.csv"),
        "lpep_pickup_datetime,passenger_count,total_amount\n2021-01-31,3,31.0\n"
    );
}

#[tokio::test]
async fn test_date_columns_besides_the_index() {
    let store = MemoryStore::new();
    store.insert(
        "cl-traffic",
        "speeds.csv",
        "segment,recorded_at,updated_at,speed\n\
         S1,2021-03-03T09:00:00.000,2021-03-03T09:30:00.000,20.5\n\
         S1,03/10/2021 09:00:00 AM,2021-03-03 11:30:00,30.5\n\
         S2,2021-03-10T10:00:00+00:00,03/10/2021 12:00:00 PM,40\n\
         S2,2021-03-11 10:00,2021-03-11 10:00,99\n",
    );

    tasks::perform(
        &store,
        &config("rs-traffic"),
        &ResampleSettings::default(),
        &TlcFileNamer,
        &WorkUnit::Files(vec!["speeds.csv".into()]),
    )
    .await
    .unwrap();

    // 2021-03-11 is a Thursday
    assert_eq!(
        text(&store, "rs-traffic", "speeds.csv"),
        "recorded_at,segment,updated_at,speed\n\
         2021-03-31,S1,2021-03-03 11:30:00,30.5\n\
         2021-03-31,S2,2021-03-10 12:00:00,40.0\n"
    );
}

#[tokio::test]
async fn test_bulk_year_without_objects_writes_nothing() {
    let memory = Arc::new(MemoryStore::new());
    memory.insert("cl-transit", "2020/part_0.txt", with_header(&year_rows()));

    let store: Arc<dyn ObjectStore> = memory.clone();
    let summary = tasks::perform_bulk(
        store,
        &config("rs-transit"),
        &ResampleSettings::default(),
        &["2021".to_string()],
    )
    .await
    .unwrap();

    assert_eq!(summary.objects_written, 0);
    assert!(memory.keys("rs-transit").is_empty());
}

#[tokio::test]
async fn test_regroup_splits_without_loss() {
    let store = MemoryStore::new();
    store.insert("rs-transit-all", "jan.csv", "STATION,DATE,ENTRIES\nA,2021-01-31,1\nB,2021-01-31,2\n");
    store.insert("rs-transit-all", "feb.csv", "STATION,DATE,ENTRIES\nA,2021-02-28,3\n");
    store.insert("rs-transit-all", "mar.csv", "STATION,DATE,ENTRIES\nB,2021-03-31,4\nA,2021-03-31,5\n");

    let summary = tasks::regroup(&store, &config("rg-transit"), false).await.unwrap();

    assert_eq!(summary.files_processed, 3);
    assert_eq!(summary.objects_written, 2);
    assert_eq!(store.keys("rg-transit"), vec!["A", "B"]);

    let mut all_rows = Vec::new();
    for station in ["A", "B"] {
        let body = text(&store, "rg-transit", station);
        let mut lines = body.lines();
        assert_eq!(lines.next().unwrap(), "STATION,DATE,ENTRIES");
        for line in lines {
            assert!(line.starts_with(&format!("{station},")));
            all_rows.push(line.to_string());
        }
    }
    all_rows.sort();
    assert_eq!(
        all_rows,
        vec![
            "A,2021-01-31,1",
            "A,2021-02-28,3",
            "A,2021-03-31,5",
            "B,2021-01-31,2",
            "B,2021-03-31,4",
        ]
    );
}

#[tokio::test]
async fn test_regroup_requires_split_column() {
    let store = MemoryStore::new();
    store.insert("cl-ycabs", "a.csv", "x\n1\n");

    let err = tasks::regroup(&store, &config("rs-ycabs"), false).await.unwrap_err();
    assert!(matches!(err, TaskError::Config(_)));
}
