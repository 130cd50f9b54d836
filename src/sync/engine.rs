//! Pull, push and merge between remote cards and local card files.
//!
//! # Operations
//!
//! - **Pull**: remote → local. Writes a pretty snapshot of every controlled
//!   card (or one explicitly requested card) and binds the file to the card.
//! - **Push**: local → remote. Renders each file, validates the rendered
//!   card and uploads it. Pushing without a file pushes every card file in
//!   the repository.
//! - **Merge**: remote → local, keeping the local `native.query`. Every
//!   other field is taken from the remote card. Nothing is uploaded.
//!
//! # Failure Handling
//!
//! Each card or file is processed independently and its outcome recorded in
//! the returned [`SyncReport`]. A connection-level remote failure stops the
//! batch and is returned as [`SyncError::Aborted`] carrying the items
//! processed so far.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{Card, CardId};
use crate::remote::RemoteGateway;
use crate::render::Renderer;
use crate::sync::store::CardStore;
use crate::sync::tag::{is_controlled, CONTROL_TAG};
use crate::sync::types::{ItemReport, ItemStatus, Operation, SyncError, SyncReport, SyncResult};

/// Output of a render-only run for one file.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedFile {
    pub file: String,
    pub output: String,
}

/// Drives sync operations for one repository against one remote.
pub struct SyncEngine<'a, G: RemoteGateway> {
    gateway: &'a G,
    store: &'a mut CardStore,
    renderer: &'a Renderer,
}

impl<'a, G: RemoteGateway> SyncEngine<'a, G> {
    #[must_use]
    pub fn new(gateway: &'a G, store: &'a mut CardStore, renderer: &'a Renderer) -> Self {
        Self {
            gateway,
            store,
            renderer,
        }
    }

    /// Pull every controlled card, in remote listing order.
    ///
    /// Existing files are overwritten unless `keep_existing` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the card list cannot be fetched, the local card
    /// files cannot be scanned or the card index cannot be saved. Per-card
    /// failures are recorded in the report.
    pub async fn pull_all(&mut self, keep_existing: bool) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(Operation::Pull);
        let cards = self.gateway.list_cards().await?;
        let total = cards.len();
        let local = self.store.identities()?;

        for card in cards {
            if !is_controlled(&card) {
                debug!(id = ?card.id(), name = card.label(), "Skipping uncontrolled card");
                continue;
            }
            let Some(id) = card.id() else {
                let err = SyncError::validation("<remote>", "card has no id");
                warn!(name = card.label(), error = %err, "Pull failed");
                report.push(ItemReport::failed(&err).name(card.label()));
                continue;
            };
            report.push(self.pull_card(id, &card, keep_existing, &local));
        }

        self.store.save_index()?;
        info!(
            listed = total,
            controlled = report.items.len(),
            failed = report.failed(),
            "Pull finished"
        );
        Ok(report)
    }

    /// Pull one card by id, whether or not it carries the control tag.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Aborted`] on connection-level failures and an
    /// error if the card files cannot be scanned or the card index cannot be
    /// saved.
    pub async fn pull_one(&mut self, id: CardId, keep_existing: bool) -> SyncResult<SyncReport> {
        let mut report = SyncReport::new(Operation::Pull);
        match self.gateway.get_card(id).await {
            Ok(card) => {
                let local = self.store.identities()?;
                report.push(self.pull_card(id, &card, keep_existing, &local));
            }
            Err(e) => {
                let err = SyncError::from(e);
                if err.is_fatal() {
                    return Err(err.abort(report));
                }
                warn!(id, error = %err, "Pull failed");
                report.push(ItemReport::failed(&err).id(id));
            }
        }
        self.store.save_index()?;
        Ok(report)
    }

    /// Writes to the indexed file, else to a local file already holding the
    /// card, else to a new `"{id} - {title}.json"`.
    fn pull_card(
        &mut self,
        id: CardId,
        card: &Card,
        keep_existing: bool,
        local: &BTreeMap<CardId, String>,
    ) -> ItemReport {
        let file = self
            .store
            .file_for(id)
            .map(str::to_owned)
            .or_else(|| local.get(&id).cloned())
            .unwrap_or_else(|| card.file_name(id));

        match self.write_snapshot(id, card, &file, keep_existing) {
            Ok(status) => {
                info!(id, file = %file, %status, "Pulled card");
                ItemReport::new(status).id(id).name(card.label()).file(file)
            }
            Err(err) => {
                warn!(id, file = %file, error = %err, "Pull failed");
                ItemReport::failed(&err).id(id).name(card.label()).file(file)
            }
        }
    }

    fn write_snapshot(
        &mut self,
        id: CardId,
        card: &Card,
        file: &str,
        keep_existing: bool,
    ) -> SyncResult<ItemStatus> {
        let exists = self.store.exists(file);
        if exists && keep_existing {
            return Ok(ItemStatus::Skipped);
        }

        let content = card
            .to_pretty_json()
            .map_err(|e| SyncError::validation(file, e.to_string()))?;

        if exists {
            let current = self.store.read(file)?;
            if current == content {
                self.store.bind(file, id);
                return Ok(ItemStatus::Unchanged);
            }
        }

        self.store.write(file, &content)?;
        self.store.record_sync(file, id);
        Ok(ItemStatus::Pulled)
    }

    /// Render and upload one file, or every card file when `file` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Aborted`] on connection-level failures and an
    /// error if the card files cannot be listed.
    pub async fn push(&mut self, file: Option<&str>) -> SyncResult<SyncReport> {
        let files = self.target_files(file)?;
        let mut report = SyncReport::new(Operation::Push);

        for file in files {
            match self.push_file(&file).await {
                Ok(item) => report.push(item),
                Err(err) if err.is_fatal() => {
                    warn!(file = %file, error = %err, "Push stopped");
                    return Err(err.abort(report));
                }
                Err(err) => {
                    warn!(file = %file, error = %err, "Push failed");
                    report.push(ItemReport::failed(&err).file(file));
                }
            }
        }

        info!(
            pushed = report.succeeded(),
            failed = report.failed(),
            "Push finished"
        );
        Ok(report)
    }

    async fn push_file(&self, file: &str) -> SyncResult<ItemReport> {
        let card = render_card(&*self.store, self.renderer, file)?;
        let id = self
            .store
            .resolve_identity(file)?
            .or_else(|| card.id())
            .ok_or_else(|| {
                SyncError::NotFound(format!(
                    "card id for {file} (pull the card first or add an \"id\" field)"
                ))
            })?;

        self.gateway.update_card(id, &card).await?;
        info!(id, file, name = card.label(), "Pushed card");
        Ok(ItemReport::new(ItemStatus::Pushed)
            .id(id)
            .name(card.label())
            .file(file))
    }

    /// Merge remote changes into one file, or every card file when `file`
    /// is `None`, keeping each file's local `native.query`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Aborted`] on connection-level failures and an
    /// error if the card files cannot be listed or the index cannot be saved.
    pub async fn merge(&mut self, file: Option<&str>) -> SyncResult<SyncReport> {
        let files = self.target_files(file)?;
        let mut report = SyncReport::new(Operation::Merge);

        for file in files {
            match self.merge_file(&file).await {
                Ok(item) => report.push(item),
                Err(err) if err.is_fatal() => {
                    warn!(file = %file, error = %err, "Merge stopped");
                    self.store.save_index()?;
                    return Err(err.abort(report));
                }
                Err(err) => {
                    warn!(file = %file, error = %err, "Merge failed");
                    report.push(ItemReport::failed(&err).file(file));
                }
            }
        }

        self.store.save_index()?;
        info!(
            merged = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            "Merge finished"
        );
        Ok(report)
    }

    async fn merge_file(&mut self, file: &str) -> SyncResult<ItemReport> {
        let text = self.store.read(file)?;
        let local = Card::parse(&text)
            .map_err(|e| SyncError::validation(file, format!("not a JSON card: {e}")))?;
        let query = local
            .native_query()
            .ok_or_else(|| SyncError::validation(file, "not a native query card"))?
            .to_owned();
        let id = self
            .store
            .resolve_identity(file)?
            .ok_or_else(|| SyncError::NotFound(format!("card id for {file}")))?;

        let mut remote = self.gateway.get_card(id).await?;
        let item = |status: ItemStatus| {
            ItemReport::new(status)
                .id(id)
                .name(remote_label(&local, id))
                .file(file)
        };

        if !is_controlled(&remote) {
            debug!(id, file, "Remote card is not controlled, skipping merge");
            return Ok(item(ItemStatus::Skipped).message("remote card is not controlled"));
        }
        if !remote.set_native_query(query) {
            return Err(SyncError::validation(
                file,
                format!("remote card {id} is not a native query"),
            ));
        }

        let name = remote.label().to_owned();
        let content = remote
            .to_pretty_json()
            .map_err(|e| SyncError::validation(file, e.to_string()))?;
        if content == text {
            self.store.bind(file, id);
            return Ok(item(ItemStatus::Unchanged).name(name));
        }

        self.store.write(file, &content)?;
        self.store.record_sync(file, id);
        info!(id, file, "Merged card");
        Ok(item(ItemStatus::Merged).name(name))
    }

    fn target_files(&self, file: Option<&str>) -> SyncResult<Vec<String>> {
        match file {
            Some(file) => Ok(vec![file.to_owned()]),
            None => self.store.list_card_files(),
        }
    }
}

fn remote_label(local: &Card, id: CardId) -> String {
    local
        .name()
        .map_or_else(|| format!("card {id}"), str::to_owned)
}

/// Render a card file and check that the output is a pushable card: a JSON
/// object with a `name` and the control tag.
///
/// # Errors
///
/// Returns [`SyncError::NotFound`] for a missing file, [`SyncError::Render`]
/// when the template fails and [`SyncError::Validation`] when the output is
/// not a pushable card.
pub fn render_card(store: &CardStore, renderer: &Renderer, file: &str) -> SyncResult<Card> {
    let output = render_text(store, renderer, file)?;
    validate_rendered(file, &output)
}

fn render_text(store: &CardStore, renderer: &Renderer, file: &str) -> SyncResult<String> {
    if !store.exists(file) {
        return Err(SyncError::NotFound(format!("file {file}")));
    }
    Ok(renderer.render(Path::new(file))?)
}

fn validate_rendered(file: &str, output: &str) -> SyncResult<Card> {
    let card = Card::parse(output).map_err(|e| {
        SyncError::validation(file, format!("rendered output is not a JSON card: {e}"))
    })?;
    if card.name().is_none() {
        return Err(SyncError::validation(file, "rendered card has no name"));
    }
    if !is_controlled(&card) {
        return Err(SyncError::validation(
            file,
            format!("rendered card does not contain the control tag `{CONTROL_TAG}`"),
        ));
    }
    Ok(card)
}

/// Render one file, or every card file, without contacting the remote.
///
/// Each file is rendered and validated like a push; the report records
/// which files would be accepted and the outputs are returned for display.
///
/// # Errors
///
/// Returns an error if the card files cannot be listed.
pub fn render_files(
    store: &CardStore,
    renderer: &Renderer,
    file: Option<&str>,
) -> SyncResult<(SyncReport, Vec<RenderedFile>)> {
    let files = match file {
        Some(file) => vec![file.to_owned()],
        None => store.list_card_files()?,
    };

    let mut report = SyncReport::new(Operation::Render);
    let mut outputs = Vec::new();
    for file in files {
        let result = render_text(store, renderer, &file).and_then(|output| {
            let card = validate_rendered(&file, &output);
            outputs.push(RenderedFile {
                file: file.clone(),
                output,
            });
            card
        });

        match result {
            Ok(card) => {
                let mut item = ItemReport::new(ItemStatus::Rendered)
                    .name(card.label())
                    .file(&file);
                if let Some(id) = store.resolve_identity(&file).ok().flatten().or(card.id()) {
                    item = item.id(id);
                }
                debug!(file = %file, "Rendered card");
                report.push(item);
            }
            Err(err) => {
                warn!(file = %file, error = %err, "Render failed");
                report.push(ItemReport::failed(&err).file(file));
            }
        }
    }
    Ok((report, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RemoteError, RemoteResult};
    use crate::sync::types::FailureKind;
    use crate::sync::store::INDEX_FILE;
    use serde_json::json;
    use std::collections::BTreeSet;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory remote with per-card failure injection.
    #[derive(Default)]
    struct FakeGateway {
        cards: Mutex<BTreeMap<CardId, Card>>,
        updates: Mutex<Vec<(CardId, Card)>>,
        /// Cards whose requests fail with a connection error.
        unreachable: BTreeSet<CardId>,
    }

    impl FakeGateway {
        fn with_cards(cards: Vec<Card>) -> Self {
            let gateway = Self::default();
            {
                let mut map = gateway.cards.lock().unwrap();
                for card in cards {
                    map.insert(card.id().unwrap(), card);
                }
            }
            gateway
        }

        fn updates(&self) -> Vec<(CardId, Card)> {
            self.updates.lock().unwrap().clone()
        }

        fn check(&self, id: CardId) -> RemoteResult<()> {
            if self.unreachable.contains(&id) {
                return Err(RemoteError::Connection {
                    url: "http://mb".into(),
                    message: "connection refused".into(),
                });
            }
            Ok(())
        }
    }

    impl RemoteGateway for FakeGateway {
        async fn list_cards(&self) -> RemoteResult<Vec<Card>> {
            Ok(self.cards.lock().unwrap().values().cloned().collect())
        }

        async fn get_card(&self, id: CardId) -> RemoteResult<Card> {
            self.check(id)?;
            self.cards
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(RemoteError::Rejected {
                    status: 404,
                    message: "Not found.".into(),
                })
        }

        async fn update_card(&self, id: CardId, card: &Card) -> RemoteResult<()> {
            self.check(id)?;
            self.updates.lock().unwrap().push((id, card.clone()));
            self.cards.lock().unwrap().insert(id, card.clone());
            Ok(())
        }
    }

    fn card(id: CardId, name: &str, query: &str) -> Card {
        Card::from_value(json!({
            "id": id,
            "name": name,
            "description": null,
            "display": "table",
            "dataset_query": {
                "type": "native",
                "database": 1,
                "native": { "query": query }
            }
        }))
        .unwrap()
    }

    fn repo() -> (TempDir, CardStore, Renderer) {
        let dir = TempDir::new().unwrap();
        let store = CardStore::open(dir.path(), Path::new("include")).unwrap();
        let renderer = Renderer::new(dir.path(), Path::new("include"));
        (dir, store, renderer)
    }

    const TAGGED: &str = "select 1 -- ## mbs_controlled ##";

    #[tokio::test]
    async fn test_pull_all_only_controlled_cards() {
        let mut described = card(3, "Churn", "select 3").into_value();
        described["description"] = json!("Owned by mbs ## mbs_controlled ##");
        let described = Card::from_value(described).unwrap();
        let gateway = FakeGateway::with_cards(vec![
            card(1, "Revenue", TAGGED),
            card(2, "Ad hoc", "select 2"),
            described,
        ]);
        let (_dir, mut store, renderer) = repo();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .pull_all(false)
            .await
            .unwrap();

        let ids: Vec<_> = report.items.iter().map(|i| i.id.unwrap()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(report.items.iter().all(|i| i.status == ItemStatus::Pulled));
        assert!(store.exists("1 - Revenue.json"));
        assert!(store.exists("3 - Churn.json"));
        assert!(!store.exists("2 - Ad hoc.json"));
        assert_eq!(store.file_for(1), Some("1 - Revenue.json"));

        let written = Card::parse(&store.read("1 - Revenue.json").unwrap()).unwrap();
        assert_eq!(written, card(1, "Revenue", TAGGED));
    }

    #[tokio::test]
    async fn test_pull_again_is_unchanged_and_keep_existing_skips() {
        let gateway = FakeGateway::with_cards(vec![card(1, "Revenue", TAGGED)]);
        let (_dir, mut store, renderer) = repo();
        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);

        engine.pull_all(false).await.unwrap();
        let again = engine.pull_all(false).await.unwrap();
        assert_eq!(again.items[0].status, ItemStatus::Unchanged);

        let kept = engine.pull_all(true).await.unwrap();
        assert_eq!(kept.items[0].status, ItemStatus::Skipped);
    }

    #[tokio::test]
    async fn test_pull_writes_to_bound_file() {
        let gateway = FakeGateway::with_cards(vec![card(1, "Revenue", TAGGED)]);
        let (_dir, mut store, renderer) = repo();
        store.write("reports/revenue.json", "{}").unwrap();
        store.bind("reports/revenue.json", 1);

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .pull_all(false)
            .await
            .unwrap();
        assert_eq!(report.items[0].file.as_deref(), Some("reports/revenue.json"));
        assert!(!store.exists("1 - Revenue.json"));
    }

    #[tokio::test]
    async fn test_pull_follows_renamed_file() {
        let gateway = FakeGateway::with_cards(vec![card(1, "Revenue", TAGGED)]);
        let (dir, mut store, renderer) = repo();
        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);
        engine.pull_all(false).await.unwrap();

        fs::create_dir_all(dir.path().join("reports")).unwrap();
        fs::rename(
            dir.path().join("1 - Revenue.json"),
            dir.path().join("reports/revenue.json"),
        )
        .unwrap();

        let report = engine.pull_all(false).await.unwrap();
        assert_eq!(report.items[0].file.as_deref(), Some("reports/revenue.json"));
        assert_eq!(report.items[0].status, ItemStatus::Unchanged);

        engine.push(None).await.unwrap();
        let pushed: Vec<_> = gateway.updates().into_iter().map(|(id, _)| id).collect();
        assert_eq!(pushed, vec![1]);
        assert!(!store.exists("1 - Revenue.json"));
        assert_eq!(store.file_for(1), Some("reports/revenue.json"));
    }

    #[tokio::test]
    async fn test_pull_uses_unindexed_file_with_same_id() {
        let gateway = FakeGateway::with_cards(vec![card(1, "Revenue", TAGGED)]);
        let (_dir, mut store, renderer) = repo();
        store
            .write("mine.json", &card(1, "Old", TAGGED).to_pretty_json().unwrap())
            .unwrap();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .pull_all(false)
            .await
            .unwrap();
        assert_eq!(report.items[0].status, ItemStatus::Pulled);
        assert_eq!(report.items[0].file.as_deref(), Some("mine.json"));
        assert!(!store.exists("1 - Revenue.json"));
    }

    #[tokio::test]
    async fn test_unchanged_pull_keeps_index_file() {
        let gateway = FakeGateway::with_cards(vec![card(1, "Revenue", TAGGED)]);
        let (dir, mut store, renderer) = repo();
        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);

        engine.pull_all(false).await.unwrap();
        let before = fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        engine.pull_all(false).await.unwrap();
        let after = fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_pull_one_connection_failure_aborts() {
        let mut gateway = FakeGateway::with_cards(vec![card(4, "X", TAGGED)]);
        gateway.unreachable.insert(4);
        let (_dir, mut store, renderer) = repo();

        let err = SyncEngine::new(&gateway, &mut store, &renderer)
            .pull_one(4, false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Aborted { processed: 0, .. }));
        assert!(!store.exists("4 - X.json"));
    }

    #[tokio::test]
    async fn test_pull_one_ignores_control_tag() {
        let gateway = FakeGateway::with_cards(vec![card(2, "Ad hoc", "select 2")]);
        let (_dir, mut store, renderer) = repo();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .pull_one(2, false)
            .await
            .unwrap();
        assert_eq!(report.items[0].status, ItemStatus::Pulled);
        assert!(store.exists("2 - Ad hoc.json"));
    }

    #[tokio::test]
    async fn test_pull_one_missing_card_is_item_failure() {
        let gateway = FakeGateway::default();
        let (_dir, mut store, renderer) = repo();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .pull_one(42, false)
            .await
            .unwrap();
        assert_eq!(report.failed(), 1);
        assert_eq!(report.items[0].error, Some(FailureKind::Remote));
        assert_eq!(report.items[0].id, Some(42));
    }

    #[tokio::test]
    async fn test_pull_then_push_round_trip() {
        let original = card(1, "Revenue", TAGGED);
        let gateway = FakeGateway::with_cards(vec![original.clone()]);
        let (_dir, mut store, renderer) = repo();
        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);

        engine.pull_all(false).await.unwrap();
        let report = engine.push(Some("1 - Revenue.json")).await.unwrap();

        assert_eq!(report.items[0].status, ItemStatus::Pushed);
        assert_eq!(gateway.updates(), vec![(1, original)]);
    }

    #[tokio::test]
    async fn test_bulk_push_is_fail_soft() {
        let gateway = FakeGateway::default();
        let (_dir, mut store, renderer) = repo();
        store
            .write("include/limit.sql", "limit {{ limit|default(10) }}")
            .unwrap();
        store
            .write(
                "a.json",
                r#"{"id": 1, "name": "A", "dataset_query": {"native": {"query": "{% filter json %}select 1 -- ## mbs_controlled ##
{% include "limit.sql" %}{% endfilter %}"}}}"#,
            )
            .unwrap();
        store
            .write("b.json", r#"{"id": 2, "name": "B", "dataset_query": {"#)
            .unwrap();
        let c = json!({"id": 3, "name": "C", "description": "## mbs_controlled ##"});
        store.write("c.json", &c.to_string()).unwrap();
        store.write("include/fragment.json", "{{ nope }}").unwrap();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .push(None)
            .await
            .unwrap();

        let statuses: Vec<_> = report.items.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![ItemStatus::Pushed, ItemStatus::Failed, ItemStatus::Pushed]
        );
        assert_eq!(report.items[1].file.as_deref(), Some("b.json"));
        assert_eq!(report.items[1].error, Some(FailureKind::Validation));

        let updates = gateway.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[0].1.native_query(),
            Some("select 1 -- ## mbs_controlled ##\nlimit 10")
        );
        assert_eq!(updates[1].0, 3);
    }

    #[tokio::test]
    async fn test_push_requires_tag_and_name() {
        let gateway = FakeGateway::default();
        let (_dir, mut store, renderer) = repo();
        store.write("untagged.json", r#"{"id": 1, "name": "A"}"#).unwrap();
        let nameless = json!({"id": 2, "description": "## mbs_controlled ##"});
        store.write("nameless.json", &nameless.to_string()).unwrap();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .push(None)
            .await
            .unwrap();
        assert_eq!(report.failed(), 2);
        assert!(
            report
                .items
                .iter()
                .all(|i| i.error == Some(FailureKind::Validation))
        );
        assert!(gateway.updates().is_empty());
    }

    #[tokio::test]
    async fn test_push_render_error_and_missing_identity() {
        let gateway = FakeGateway::default();
        let (_dir, mut store, renderer) = repo();
        store.write("broken.json", "{{ undefined_var }}").unwrap();
        let noid = json!({"name": "N", "description": "## mbs_controlled ##"});
        store.write("noid.json", &noid.to_string()).unwrap();

        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);
        let broken = engine.push(Some("broken.json")).await.unwrap();
        assert_eq!(broken.items[0].error, Some(FailureKind::Render));

        let noid = engine.push(Some("noid.json")).await.unwrap();
        assert_eq!(noid.items[0].error, Some(FailureKind::NotFound));

        let missing = engine.push(Some("missing.json")).await.unwrap();
        assert_eq!(missing.items[0].error, Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn test_push_uses_indexed_identity() {
        let gateway = FakeGateway::default();
        let (_dir, mut store, renderer) = repo();
        let q = json!({"id": 1, "name": "Q", "description": "## mbs_controlled ##"});
        store.write("q.json", &q.to_string()).unwrap();
        store.bind("q.json", 9);

        SyncEngine::new(&gateway, &mut store, &renderer)
            .push(Some("q.json"))
            .await
            .unwrap();
        assert_eq!(gateway.updates()[0].0, 9);
    }

    #[tokio::test]
    async fn test_connection_failure_aborts_batch() {
        let mut gateway = FakeGateway::default();
        gateway.unreachable.insert(2);
        let (_dir, mut store, renderer) = repo();
        for (id, file) in [(1, "a.json"), (2, "b.json"), (3, "c.json")] {
            let doc = json!({"id": id, "name": file, "description": "## mbs_controlled ##"});
            store.write(file, &doc.to_string()).unwrap();
        }

        let err = SyncEngine::new(&gateway, &mut store, &renderer)
            .push(None)
            .await
            .unwrap_err();

        match err {
            SyncError::Aborted {
                processed, report, ..
            } => {
                assert_eq!(processed, 1);
                assert_eq!(report.items[0].file.as_deref(), Some("a.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let pushed: Vec<_> = gateway.updates().into_iter().map(|(id, _)| id).collect();
        assert_eq!(pushed, vec![1]);
    }

    #[tokio::test]
    async fn test_merge_connection_failure_saves_index() {
        let mut gateway = FakeGateway::with_cards(vec![
            card(1, "A renamed", TAGGED),
            card(2, "B", TAGGED),
        ]);
        gateway.unreachable.insert(2);
        let (dir, mut store, renderer) = repo();
        let local_a = card(1, "A", "select 9 -- ## mbs_controlled ##");
        store.write("a.json", &local_a.to_pretty_json().unwrap()).unwrap();
        store
            .write("b.json", &card(2, "B", TAGGED).to_pretty_json().unwrap())
            .unwrap();

        let err = SyncEngine::new(&gateway, &mut store, &renderer)
            .merge(None)
            .await
            .unwrap_err();

        match err {
            SyncError::Aborted {
                processed, report, ..
            } => {
                assert_eq!(processed, 1);
                assert_eq!(report.items[0].status, ItemStatus::Merged);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let reopened = CardStore::open(dir.path(), Path::new("include")).unwrap();
        assert_eq!(reopened.file_for(1), Some("a.json"));
        assert_eq!(reopened.file_for(2), None);
    }

    #[tokio::test]
    async fn test_merge_keeps_local_query() {
        let local_query = "select {{ limit|default(10) }} -- ## mbs_controlled ##";
        let mut remote = card(7, "New name", "select 1 -- ## mbs_controlled ##").into_value();
        remote["display"] = json!("bar");
        let gateway = FakeGateway::with_cards(vec![Card::from_value(remote).unwrap()]);

        let (_dir, mut store, renderer) = repo();
        let local = card(7, "Old name", local_query);
        store.write("q.json", &local.to_pretty_json().unwrap()).unwrap();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .merge(Some("q.json"))
            .await
            .unwrap();
        assert_eq!(report.items[0].status, ItemStatus::Merged);
        assert_eq!(report.items[0].name.as_deref(), Some("New name"));

        let merged = Card::parse(&store.read("q.json").unwrap()).unwrap();
        assert_eq!(merged.native_query(), Some(local_query));
        assert_eq!(merged.name(), Some("New name"));
        assert_eq!(merged.get("display"), Some(&json!("bar")));
        assert!(gateway.updates().is_empty());
        assert_eq!(store.file_for(7), Some("q.json"));
    }

    #[tokio::test]
    async fn test_merge_twice_is_unchanged() {
        let gateway = FakeGateway::with_cards(vec![card(7, "Q", TAGGED)]);
        let (_dir, mut store, renderer) = repo();
        let local = card(7, "Q", "select 2 -- ## mbs_controlled ##");
        store.write("q.json", &local.to_pretty_json().unwrap()).unwrap();

        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);
        assert_eq!(
            engine.merge(Some("q.json")).await.unwrap().items[0].status,
            ItemStatus::Unchanged
        );
    }

    #[tokio::test]
    async fn test_merge_skips_uncontrolled_remote() {
        let gateway = FakeGateway::with_cards(vec![card(7, "Q", "select 1")]);
        let (_dir, mut store, renderer) = repo();
        let before = card(7, "Q", TAGGED).to_pretty_json().unwrap();
        store.write("q.json", &before).unwrap();

        let report = SyncEngine::new(&gateway, &mut store, &renderer)
            .merge(None)
            .await
            .unwrap();
        assert_eq!(report.items[0].status, ItemStatus::Skipped);
        assert_eq!(store.read("q.json").unwrap(), before);
    }

    #[tokio::test]
    async fn test_merge_failures() {
        let gateway = FakeGateway::default();
        let (_dir, mut store, renderer) = repo();
        store
            .write("noid.json", r#"{"dataset_query": {"native": {"query": "x"}}}"#)
            .unwrap();
        store.write("gui.json", r#"{"id": 1, "dataset_query": {}}"#).unwrap();

        let mut engine = SyncEngine::new(&gateway, &mut store, &renderer);
        let report = engine.merge(None).await.unwrap();
        assert_eq!(report.items[0].file.as_deref(), Some("gui.json"));
        assert_eq!(report.items[0].error, Some(FailureKind::Validation));
        assert_eq!(report.items[1].error, Some(FailureKind::NotFound));

        let missing = engine.merge(Some("missing.json")).await.unwrap();
        assert_eq!(missing.items[0].error, Some(FailureKind::NotFound));
    }

    #[test]
    fn test_render_files_without_remote() {
        let (_dir, store, renderer) = repo();
        let q = json!({"id": 4, "name": "{{ mbs_file }}", "description": "## mbs_controlled ##"});
        store.write("q.json", &q.to_string()).unwrap();
        store.write("bad.json", "not json").unwrap();

        let (report, outputs) = render_files(&store, &renderer, None).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(report.items[0].file.as_deref(), Some("bad.json"));
        assert_eq!(report.items[0].error, Some(FailureKind::Validation));
        assert_eq!(report.items[1].status, ItemStatus::Rendered);
        assert_eq!(report.items[1].id, Some(4));
        assert_eq!(report.items[1].name.as_deref(), Some("q.json"));
        let rendered = Card::parse(&outputs[1].output).unwrap();
        assert_eq!(rendered.name(), Some("q.json"));
    }
}
