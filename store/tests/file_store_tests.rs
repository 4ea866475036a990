use chrono::DateTime;
use rust_decimal::dec;

use common::keys::{GpuKey, HourKey};
use store::{
    BidEntry, Config, Day, DayStatus, Document, DocumentStore, FileStore, Role, User,
};

fn sample_document() -> Document {
    let mut doc = Document::bootstrap(Config::default());

    doc.users.insert(
        "ada".to_string(),
        User {
            password_hash: "aa".repeat(32),
            salt: "bb".repeat(16),
            role: Role::User,
            weekly_budget: 10,
            balance: dec!(7.34),
            rollover_applied_for_day: None,
            extra: Default::default(),
        },
    );

    let day = "2025-06-10".parse().unwrap();
    let labels: [u8; 24] = std::array::from_fn(|i| i as u8);
    let mut d = Day::empty(DayStatus::Open, &labels, 2);
    let slot = &mut d.slots.get_mut(&HourKey(14)).unwrap()[1];
    slot.price = 2;
    slot.winner = Some("ada".to_string());
    slot.bids.push(BidEntry {
        user: "ada".to_string(),
        price: 2,
        ts: DateTime::parse_from_rfc3339("2025-06-10T09:15:00-04:00").unwrap(),
        undone: false,
        extra: Default::default(),
    });
    doc.days.insert(day, d);

    doc.usage_samples
        .entry(day)
        .or_default()
        .entry(HourKey(14))
        .or_default()
        .entry(GpuKey(1))
        .or_default()
        .insert("ada".to_string(), 3);

    doc
}

#[tokio::test]
async fn missing_file_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let fs = FileStore::new(dir.path().join("state.json"));
    assert!(fs.load().await.unwrap().is_none());
}

#[tokio::test]
async fn save_load_save_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let fs = FileStore::new(dir.path().join("state.json"));

    let doc = sample_document();
    fs.save(&doc).await.unwrap();
    let loaded = fs.load().await.unwrap().unwrap();

    // Same serialization modulo nothing: keys are ordered maps throughout.
    let first = serde_json::to_value(&doc).unwrap();
    let second = serde_json::to_value(&loaded).unwrap();
    assert_eq!(first, second);

    fs.save(&loaded).await.unwrap();
    let reloaded = fs.load().await.unwrap().unwrap();
    assert_eq!(second, serde_json::to_value(&reloaded).unwrap());
}

#[tokio::test]
async fn unknown_fields_survive_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let fs = FileStore::new(&path);

    let mut raw = serde_json::to_value(sample_document()).unwrap();
    let obj = raw.as_object_mut().unwrap();
    obj.insert("added_by_future_build".into(), serde_json::json!({"n": 1}));
    obj["users"]["ada"]
        .as_object_mut()
        .unwrap()
        .insert("preferred_gpu".into(), serde_json::json!(3));
    tokio::fs::write(&path, serde_json::to_vec(&raw).unwrap())
        .await
        .unwrap();

    let doc = fs.load().await.unwrap().unwrap();
    fs.save(&doc).await.unwrap();

    let rewritten: serde_json::Value =
        serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
    assert_eq!(rewritten["added_by_future_build"]["n"], 1);
    assert_eq!(rewritten["users"]["ada"]["preferred_gpu"], 3);
}

#[tokio::test]
async fn save_replaces_not_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let fs = FileStore::new(&path);

    let mut doc = sample_document();
    fs.save(&doc).await.unwrap();

    doc.users.remove("ada");
    fs.save(&doc).await.unwrap();

    let loaded = fs.load().await.unwrap().unwrap();
    assert!(loaded.users.is_empty());
    // No stray tmp file left behind.
    assert!(!path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn live_users_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let fs = FileStore::new(dir.path().join("state.json"));

    let mut doc = sample_document();
    let key = common::keys::SlotKey::new("2025-06-10".parse().unwrap(), 14, 1);
    doc.slot_mut(&key).unwrap().live_users = vec!["ada".to_string()];
    fs.save(&doc).await.unwrap();

    let loaded = fs.load().await.unwrap().unwrap();
    assert!(loaded.slot(&key).unwrap().live_users.is_empty());
}
