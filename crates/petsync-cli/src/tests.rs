use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use petsync_core::db::Database;
use petsync_core::outbox::OutboxStore;
use petsync_core::pull::PullSkip;
use petsync_core::records::RecordStore;
use petsync_core::{
    OpType, OutboxEntry, OutboxKey, PetId, PetRecord, PullOutcome, PushOutcome, SkipReason,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use crate::cli::{CompletionShell, PetFields};
use crate::commands::common::{
    format_pet_lines, format_relative_time, normalize_pet_identifier, pet_name, resolve_pet,
};
use crate::commands::completions::render_completions;
use crate::commands::config::{merge_profile, ProfileInput};
use crate::commands::outbox::format_outbox_lines;
use crate::commands::pets::{
    apply_patch, build_patch, new_pet_record, parse_assignment, run_add, run_delete, run_update,
};
use crate::commands::sync::{describe_pull, describe_push};
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn fields(name: &str) -> PetFields {
    PetFields {
        name: Some(name.to_string()),
        ..PetFields::default()
    }
}

fn record(value: Value) -> PetRecord {
    PetRecord::from_value(value).unwrap()
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn normalize_pet_identifier_rejects_blank() {
    assert_eq!(normalize_pet_identifier("  abc ").unwrap(), "abc");
    assert!(matches!(
        normalize_pet_identifier("   "),
        Err(CliError::EmptyPetId)
    ));
}

#[test]
fn parse_assignment_prefers_json_values() {
    assert_eq!(
        parse_assignment("vitals={\"temp\":38.5}").unwrap(),
        ("vitals".to_string(), json!({"temp": 38.5}))
    );
    assert_eq!(
        parse_assignment("color=brown tabby").unwrap(),
        ("color".to_string(), json!("brown tabby"))
    );
    assert_eq!(
        parse_assignment("microchip=").unwrap(),
        ("microchip".to_string(), json!(""))
    );
}

#[test]
fn parse_assignment_rejects_malformed_and_reserved_keys() {
    assert!(parse_assignment("no-equals").is_err());
    assert!(parse_assignment("=value").is_err());
    assert!(parse_assignment("id=abc").is_err());
    assert!(parse_assignment("patient={}").is_err());
}

#[test]
fn build_patch_trims_text_and_parses_weight() {
    let patch = build_patch(&PetFields {
        name: Some("  Rex ".to_string()),
        species: Some("   ".to_string()),
        weight: Some("4,5".to_string()),
        extra: vec!["breed_group=terrier".to_string()],
        ..PetFields::default()
    })
    .unwrap();

    assert_eq!(
        Value::Object(patch),
        json!({"name": "Rex", "weight": 4.5, "breed_group": "terrier"})
    );
}

#[test]
fn build_patch_rejects_unparseable_weight() {
    let error = build_patch(&PetFields {
        weight: Some("heavy".to_string()),
        ..PetFields::default()
    })
    .unwrap_err();
    assert!(error.to_string().contains("heavy"));
}

#[test]
fn new_pet_record_gets_temporary_id_and_both_shapes() {
    let id = PetId::new_temporary();
    let mut patch = Map::new();
    patch.insert("name".into(), json!("Rex"));

    let created = new_pet_record(&id, patch);

    assert_eq!(created.id(), Some(id));
    assert_eq!(created.text("name"), Some("Rex"));
    assert_eq!(
        created.patient().and_then(|patient| patient.get("petName")),
        Some(&json!("Rex"))
    );
    assert!(created.text("updated_at").is_some());
}

#[test]
fn apply_patch_renames_flat_and_nested() {
    let local = record(json!({
        "id": "srv-1",
        "name": "Rex",
        "breed": "Beagle",
        "patient": {"petName": "Rex", "breed": "Beagle"}
    }));
    let mut patch = Map::new();
    patch.insert("name".into(), json!("Max"));

    let updated = apply_patch(&local, &patch);

    assert_eq!(updated.text("name"), Some("Max"));
    assert_eq!(updated.text("breed"), Some("Beagle"));
    assert_eq!(pet_name(&updated), "Max");
    assert_eq!(
        updated.patient().and_then(|patient| patient.get("petName")),
        Some(&json!("Max"))
    );
}

#[test]
fn pet_name_falls_back_to_patient_then_placeholder() {
    assert_eq!(
        pet_name(&record(json!({"id": "a", "patient": {"petName": "Luna"}}))),
        "Luna"
    );
    assert_eq!(pet_name(&record(json!({"id": "a"}))), "(unnamed)");
}

#[test]
fn format_pet_lines_show_short_id_and_species() {
    let lines = format_pet_lines(&[record(json!({
        "id": "srv-123456789012345",
        "name": "Rex",
        "species": "dog"
    }))]);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("srv-123456789"));
    assert!(lines[0].contains("Rex"));
    assert!(lines[0].contains("dog"));
}

#[test]
fn format_outbox_lines_mark_unsent_entries() {
    let entries = vec![
        (
            OutboxKey(1),
            OutboxEntry::new(OpType::Create, Map::new(), None, PetId::from("tmp-a")),
        ),
        (
            OutboxKey(2),
            OutboxEntry::new(
                OpType::Delete,
                Map::new(),
                Some("op-2".into()),
                PetId::from("srv-9"),
            ),
        ),
    ];

    let lines = format_outbox_lines(&entries);

    assert!(lines[0].contains("create"));
    assert!(lines[0].contains("(not sent)"));
    assert!(lines[1].contains("delete"));
    assert!(lines[1].ends_with("op-2"));
}

#[test]
fn describe_outcomes_explain_next_step() {
    assert!(describe_push(&PushOutcome::Skipped(SkipReason::Unauthenticated))
        .contains("petsync auth login"));
    assert_eq!(
        describe_push(&PushOutcome::Completed {
            accepted: 2,
            rejected: 1
        }),
        "Pushed 2 change(s); 1 rejected and kept queued"
    );
    assert!(describe_push(&PushOutcome::Unreachable).contains("kept queued"));
    assert!(describe_pull(&PullOutcome::Skipped(PullSkip::Throttled)).contains("--force"));
    assert_eq!(
        describe_pull(&PullOutcome::Applied {
            upserts: 3,
            deletes: 1,
            cursor: Some("v7".into())
        }),
        "Pulled 3 update(s), 1 deletion(s) (cursor v7)"
    );
}

#[test]
fn merge_profile_prefers_explicit_values_and_keeps_device_id() {
    let existing = CliProfile {
        api_base_url: Some("https://stored.example.com".into()),
        device_id: Some("device-1".into()),
        push_interval_secs: Some(60),
        pull_min_interval_ms: None,
    };

    let merged = merge_profile(
        &existing,
        ProfileInput {
            api_base_url: Some("https://cli.example.com/".into()),
            ..ProfileInput::default()
        },
        Some("https://env.example.com".into()),
    );

    assert_eq!(merged.api_base_url.as_deref(), Some("https://cli.example.com"));
    assert_eq!(merged.device_id.as_deref(), Some("device-1"));
    assert_eq!(merged.push_interval_secs, Some(60));
}

#[test]
fn merge_profile_generates_device_id_once() {
    let merged = merge_profile(&CliProfile::default(), ProfileInput::default(), None);
    let device_id = merged.device_id.clone().unwrap();
    assert!(!device_id.is_empty());
    assert_eq!(merged.api_base_url, None);

    let again = merge_profile(&merged, ProfileInput::default(), None);
    assert_eq!(again.device_id.as_deref(), Some(device_id.as_str()));
}

#[test]
fn completions_use_binary_name() {
    for shell in [CompletionShell::Bash, CompletionShell::Zsh, CompletionShell::Fish] {
        let script = String::from_utf8(render_completions(shell)).unwrap();
        assert!(script.contains("petsync"));
    }
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn add_then_update_folds_into_single_create() {
    let db_path = unique_test_db_path();

    run_add(fields("Rex"), &db_path).await.unwrap();
    let id = {
        let db = Database::open(&db_path).await.unwrap();
        let pets = db.records().list().await.unwrap();
        assert_eq!(pets.len(), 1);
        pets[0].id().unwrap()
    };
    assert!(id.is_temporary());

    run_update(id.as_str(), fields("Max"), &db_path).await.unwrap();

    let db = Database::open(&db_path).await.unwrap();
    let entries = db.outbox().scan().await.unwrap();
    assert_eq!(entries.len(), 1);
    let (_, entry) = &entries[0];
    assert_eq!(entry.op_type, OpType::Create);
    assert_eq!(entry.pet_local_id, id);
    assert_eq!(entry.payload.get("name"), Some(&json!("Max")));
    let stored = db.records().get(&id).await.unwrap().unwrap();
    assert_eq!(pet_name(&stored), "Max");

    drop(db);
    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn deleting_unsent_pet_cancels_its_create() {
    let db_path = unique_test_db_path();

    run_add(fields("Rex"), &db_path).await.unwrap();
    let id = {
        let db = Database::open(&db_path).await.unwrap();
        db.records().list().await.unwrap()[0].id().unwrap()
    };

    run_delete(id.as_str(), &db_path).await.unwrap();

    let db = Database::open(&db_path).await.unwrap();
    assert!(db.outbox().scan().await.unwrap().is_empty());
    assert!(db.records().list().await.unwrap().is_empty());

    drop(db);
    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn deleting_synced_pet_queues_delete_with_base_version() {
    let db_path = unique_test_db_path();
    {
        let db = Database::open(&db_path).await.unwrap();
        let id = PetId::from("srv-42");
        db.records()
            .put(&id, &record(json!({"id": "srv-42", "name": "Rex", "version": 3})))
            .await
            .unwrap();
    }

    run_delete("srv-42", &db_path).await.unwrap();

    let db = Database::open(&db_path).await.unwrap();
    let entries = db.outbox().scan().await.unwrap();
    assert_eq!(entries.len(), 1);
    let (_, entry) = &entries[0];
    assert_eq!(entry.op_type, OpType::Delete);
    assert_eq!(
        Value::Object(entry.payload.clone()),
        json!({"id": "srv-42", "base_version": 3})
    );

    drop(db);
    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn resolve_pet_matches_unique_prefix_and_reports_ambiguity() {
    let db_path = unique_test_db_path();
    let db = Database::open(&db_path).await.unwrap();
    let records = db.records();
    for id in ["srv-100", "srv-101", "srv-200"] {
        records
            .put(&PetId::from(id), &record(json!({"id": id, "name": id})))
            .await
            .unwrap();
    }

    let (id, _) = resolve_pet("srv-2", &records).await.unwrap();
    assert_eq!(id, PetId::from("srv-200"));

    let (exact, _) = resolve_pet("srv-101", &records).await.unwrap();
    assert_eq!(exact, PetId::from("srv-101"));

    assert!(matches!(
        resolve_pet("srv-1", &records).await,
        Err(CliError::AmbiguousPetId(_))
    ));
    assert!(matches!(
        resolve_pet("nope", &records).await,
        Err(CliError::PetNotFound(_))
    ));

    drop(db);
    cleanup_db_files(&db_path);
}

#[cfg_attr(windows, ignore = "libsql integration is flaky on windows CI")]
#[tokio::test(flavor = "current_thread")]
async fn update_without_fields_is_rejected() {
    let db_path = unique_test_db_path();
    let result = run_update("anything", PetFields::default(), &db_path).await;
    assert!(matches!(result, Err(CliError::NoChanges)));
    cleanup_db_files(&db_path);
}

fn unique_test_db_path() -> PathBuf {
    static NEXT_TEST_DB_ID: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    let sequence = NEXT_TEST_DB_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("petsync-cli-test-{timestamp}-{sequence}.db"))
}

fn cleanup_db_files(path: &PathBuf) {
    // On Windows, libsql can keep file handles alive briefly after drop.
    if cfg!(windows) {
        return;
    }

    let _ = std::fs::remove_file(path);
    let _ = std::fs::remove_file(path.with_extension("db-shm"));
    let _ = std::fs::remove_file(path.with_extension("db-wal"));
}
