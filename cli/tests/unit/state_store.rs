//! File-backed state store: round-trips and durability across instances.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use converge_cli::application::ports::StateStore;
use converge_cli::infra::state::FileStateStore;
use proptest::prelude::*;

use crate::helpers::{Harness, full_desired};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

proptest! {
    /// Whatever pins are written can be read back, listed in name order,
    /// and removed again.
    #[test]
    fn prop_pins_round_trip(
        pins in proptest::collection::btree_map("[a-z][a-z0-9-]{0,12}", "[0-9]{1,2}(\\.[0-9]{1,3}){0,2}", 0..6)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf());
        let rt = runtime();

        let listed: BTreeMap<String, String> = rt.block_on(async {
            for (name, version) in &pins {
                store.set_pin(name, version).await.unwrap();
            }
            store
                .list_pins()
                .await
                .unwrap()
                .into_iter()
                .map(|p| (p.plugin_name, p.version))
                .collect()
        });
        prop_assert_eq!(&listed, &pins);

        let flags = rt.block_on(store.list_flags()).unwrap();
        prop_assert!(flags.is_empty(), "pins must not show up as flags: {:?}", flags);

        rt.block_on(async {
            for name in pins.keys() {
                store.delete_pin(name).await.unwrap();
            }
        });
        prop_assert!(rt.block_on(store.list_pins()).unwrap().is_empty());
    }

    /// Digests are overwritten, flags are not.
    #[test]
    fn prop_digest_last_write_wins(first in "[a-f0-9]{64}", second in "[a-f0-9]{64}") {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf());
        let rt = runtime();

        let read = rt.block_on(async {
            store.set_digest("settings", &first).await.unwrap();
            store.set_digest("settings", &second).await.unwrap();
            store.get_digest("settings").await.unwrap()
        });
        prop_assert_eq!(read, Some(second));
    }
}

#[tokio::test]
async fn test_completed_run_is_visible_to_a_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::default();
    let doc = full_desired();
    let store = FileStateStore::new(dir.path().to_path_buf());
    let reconciler = converge_cli::application::services::reconcile::Reconciler {
        state: &store,
        server: &h.server,
        templates: &h.templates,
        secrets: &h.secrets,
        fs: &h.fs,
        reporter: &h.reporter,
        options: h.options.clone(),
    };
    assert!(reconciler.reconcile(&doc).await.is_success());

    let reopened = FileStateStore::new(dir.path().to_path_buf());
    assert!(reopened.get_flag("automation_user_created").await.unwrap());
    assert_eq!(reopened.get_pin("git").await.unwrap().unwrap().version, "3.9.1");
    assert!(reopened.get_digest("settings").await.unwrap().is_some());

    let again = converge_cli::application::services::reconcile::Reconciler {
        state: &reopened,
        ..reconciler
    };
    let report = again.reconcile(&doc).await;
    assert!(report.is_success());
    assert_eq!(report.changed_count(), 0, "{:#?}", report.actions);
}
