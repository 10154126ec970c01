//! Engine-backed message handler.
//!
//! Bridges trigger messages to the batch runner and binds the progress
//! store's notification channel to the live client connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use panovault_engine::{BatchRunner, CatalogLister, GlobalPatch, ProgressStore, ProgressUpdate};
use panovault_protocol::MessageType;
use panovault_protocol::constants::{ERR_BAD_REQUEST, ERR_BATCH_ACTIVE, ERR_NOT_FOUND};
use panovault_protocol::envelope::Message;
use panovault_protocol::messages::{
    ClientHello, DownloadPhotoRequest, OperationResult, StartBatchRequest,
};
use panovault_protocol::types::Photo;

use crate::connection::Sender;
use crate::handler::{Handler, HandlerFuture};
use crate::session::Session;

/// Production [`Handler`]: triggers drive the engine, progress flows back.
pub struct EngineHandler {
    store: Arc<ProgressStore>,
    runner: Arc<BatchRunner>,
    session: Arc<Session>,
    catalog: Option<Arc<dyn CatalogLister>>,
}

impl EngineHandler {
    pub fn new(store: Arc<ProgressStore>, runner: Arc<BatchRunner>) -> Self {
        Self {
            store,
            runner,
            session: Arc::new(Session::new()),
            catalog: None,
        }
    }

    /// Adds a catalog client used to resolve photo ids the session has not
    /// seen (a `download_photo` before any `start_batch`, or after the
    /// post-batch cache clear).
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLister>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    async fn resolve_photo(&self, photo_id: &str) -> Option<Photo> {
        if let Some(photo) = self.session.find(photo_id) {
            return Some(photo);
        }
        let catalog = self.catalog.as_ref()?;
        match catalog.list_catalog().await {
            Ok(photos) => photos.into_iter().find(|p| p.id == photo_id),
            Err(e) => {
                warn!(photo = photo_id, "catalog lookup failed: {e}");
                None
            }
        }
    }

    /// Binds the progress feed to this sender.
    ///
    /// Replacing the store channel drops the previous forwarder's receive
    /// side, which ends that task. If a batch is mid-flight the store pushes
    /// a snapshot first, so a reconnecting client starts from current state.
    fn bind_feed(&self, sender: Sender) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.store.attach(tx);
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if sender.send_notification(&notification).is_err() {
                    break;
                }
            }
        });
    }

    fn reply_result(sender: &Sender, msg: &Message, result: OperationResult) {
        match msg.reply(MessageType::OperationResult, Some(&result)) {
            Ok(reply) => {
                let _ = sender.send_msg(reply);
            }
            Err(e) => warn!("failed to encode reply: {e}"),
        }
    }
}

impl Handler for EngineHandler {
    fn on_client_hello(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            match msg.parse_payload::<ClientHello>() {
                Ok(Some(hello)) => {
                    info!(name = %hello.name, version = %hello.version, "client connected")
                }
                Ok(None) => info!("client connected (anonymous)"),
                Err(e) => {
                    let _ = sender.send_error(&msg, ERR_BAD_REQUEST, &format!("bad hello: {e}"));
                    return;
                }
            }
            self.bind_feed(sender.clone());
            Self::reply_result(&sender, &msg, OperationResult::accepted());
        })
    }

    fn on_start_batch(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let request: StartBatchRequest = match msg.parse_payload() {
                Ok(Some(r)) => r,
                Ok(None) => {
                    let _ = sender.send_error(&msg, ERR_BAD_REQUEST, "missing payload");
                    return;
                }
                Err(e) => {
                    let _ = sender.send_error(&msg, ERR_BAD_REQUEST, &format!("bad payload: {e}"));
                    return;
                }
            };

            if self.store.get().global.in_progress {
                let _ = sender.send_error(&msg, ERR_BATCH_ACTIVE, "a batch is already running");
                return;
            }

            info!(
                photos = request.photos.len(),
                downloaded = request.downloaded_count,
                "batch trigger accepted"
            );
            self.session.set_catalog(Vec::new(), request.photos.clone());
            self.store.reset();
            Self::reply_result(&sender, &msg, OperationResult::accepted());

            let runner = Arc::clone(&self.runner);
            let store = Arc::clone(&self.store);
            let session = Arc::clone(&self.session);
            tokio::spawn(async move {
                // Run on its own task so a panic inside the engine cannot
                // leave the global record stuck mid-batch.
                let run = tokio::spawn(async move {
                    runner
                        .run_batch(
                            request.photos,
                            request.downloaded_count,
                            request.missing_count,
                        )
                        .await
                });
                if let Err(e) = run.await {
                    error!("batch task failed: {e}");
                    store.update(ProgressUpdate::Global(GlobalPatch {
                        error: Some("internal transfer failure".into()),
                        ..GlobalPatch::terminal("Backup failed unexpectedly")
                    }));
                }
                // The split is stale after any run; the client re-lists.
                session.clear();
            });
        })
    }

    fn on_cancel_batch(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if !self.store.get().global.in_progress {
                Self::reply_result(
                    &sender,
                    &msg,
                    OperationResult::rejected("no batch in progress"),
                );
                return;
            }
            info!("cancel trigger accepted");
            self.runner.cancel();
            Self::reply_result(&sender, &msg, OperationResult::accepted());
        })
    }

    fn on_download_photo(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            let request: DownloadPhotoRequest = match msg.parse_payload() {
                Ok(Some(r)) => r,
                Ok(None) => {
                    let _ = sender.send_error(&msg, ERR_BAD_REQUEST, "missing payload");
                    return;
                }
                Err(e) => {
                    let _ = sender.send_error(&msg, ERR_BAD_REQUEST, &format!("bad payload: {e}"));
                    return;
                }
            };

            let Some(photo) = self.resolve_photo(&request.photo_id).await else {
                let _ = sender.send_error(
                    &msg,
                    ERR_NOT_FOUND,
                    &format!("unknown photo: {}", request.photo_id),
                );
                return;
            };

            info!(photo = %photo.id, "single download trigger accepted");
            Self::reply_result(&sender, &msg, OperationResult::accepted());

            let runner = Arc::clone(&self.runner);
            let session = Arc::clone(&self.session);
            tokio::spawn(async move {
                if runner.run_single(&photo).await.is_ok() {
                    session.mark_downloaded(&photo.id);
                }
            });
        })
    }

    fn on_client_disconnected(&self) -> HandlerFuture<'_> {
        Box::pin(async move {
            // The batch (if any) keeps running; only the feed goes away.
            self.store.detach();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use panovault_engine::{
        ClientFuture, DestinationStore, EmbedError, ExifCodec, PercentFn, SourceDownloader,
        TransferError,
    };
    use panovault_protocol::types::{Folder, Photo, Pose, StoredFile};
    use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

    struct StubDownloader;

    impl SourceDownloader for StubDownloader {
        fn download<'a>(
            &'a self,
            _url: &'a str,
            on_progress: PercentFn,
        ) -> ClientFuture<'a, Vec<u8>> {
            Box::pin(async move {
                on_progress(100);
                Ok(vec![0xFF, 0xD8])
            })
        }
    }

    struct NullDest;

    impl DestinationStore for NullDest {
        fn find_or_create_folder<'a>(&'a self, name: &'a str) -> ClientFuture<'a, Folder> {
            Box::pin(async move {
                Ok(Folder {
                    id: name.to_string(),
                    link: format!("mem://{name}"),
                })
            })
        }

        fn list_files<'a>(&'a self, _folder_id: &'a str) -> ClientFuture<'a, Vec<StoredFile>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn create_file<'a>(
            &'a self,
            name: &'a str,
            _mime_type: &'a str,
            _bytes: Vec<u8>,
            _folder_id: &'a str,
            _on_progress: PercentFn,
        ) -> ClientFuture<'a, StoredFile> {
            Box::pin(async move {
                Ok(StoredFile {
                    id: format!("id-{name}"),
                    name: name.to_string(),
                    link: format!("mem://{name}"),
                })
            })
        }

        fn update_file<'a>(
            &'a self,
            _file_id: &'a str,
            _mime_type: &'a str,
            _bytes: Vec<u8>,
            _on_progress: PercentFn,
        ) -> ClientFuture<'a, StoredFile> {
            Box::pin(async { Err(TransferError::Destination("not seeded".into())) })
        }
    }

    struct PassthroughCodec;

    impl ExifCodec for PassthroughCodec {
        fn embed(&self, image: &[u8], _pose: &Pose) -> Result<Vec<u8>, EmbedError> {
            Ok(image.to_vec())
        }
    }

    struct PanickyCodec;

    impl ExifCodec for PanickyCodec {
        fn embed(&self, _image: &[u8], _pose: &Pose) -> Result<Vec<u8>, EmbedError> {
            panic!("segment underflow")
        }
    }

    struct FixedCatalog {
        photos: Vec<Photo>,
    }

    impl CatalogLister for FixedCatalog {
        fn list_catalog<'a>(&'a self) -> ClientFuture<'a, Vec<Photo>> {
            Box::pin(async move { Ok(self.photos.clone()) })
        }
    }

    fn handler_with_codec(codec: Arc<dyn ExifCodec>) -> EngineHandler {
        let store = Arc::new(ProgressStore::new());
        let runner = Arc::new(BatchRunner::new(
            Arc::clone(&store),
            Arc::new(StubDownloader),
            Arc::new(NullDest),
            codec,
        ));
        EngineHandler::new(store, runner)
    }

    fn handler() -> EngineHandler {
        handler_with_codec(Arc::new(PassthroughCodec))
    }

    fn photo(id: &str) -> Photo {
        Photo {
            id: id.into(),
            download_url: format!("https://example.com/{id}"),
            pose: None,
            capture_time: None,
            view_count: 0,
        }
    }

    async fn next_envelope(rx: &mut tokio::sync::mpsc::Receiver<WsMessage>) -> Message {
        match rx.recv().await.expect("expected a frame") {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_batch_without_payload_is_bad_request() {
        let handler = handler();
        let (sender, mut rx) = Sender::channel(16);
        let msg = Message::new::<()>("m1", MessageType::StartBatch, None).unwrap();

        handler.on_start_batch(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        assert_eq!(reply.error.as_ref().unwrap().code, ERR_BAD_REQUEST);
    }

    #[tokio::test]
    async fn start_batch_while_running_is_conflict() {
        let handler = handler();
        // Simulate a running batch.
        handler
            .store
            .update(panovault_engine::ProgressUpdate::Global(
                panovault_engine::GlobalPatch {
                    in_progress: Some(true),
                    ..Default::default()
                },
            ));

        let request = StartBatchRequest {
            photos: vec![photo("a")],
            downloaded_count: 0,
            missing_count: 1,
        };
        let msg = Message::new("m1", MessageType::StartBatch, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_start_batch(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        assert_eq!(reply.error.as_ref().unwrap().code, ERR_BATCH_ACTIVE);
    }

    #[tokio::test]
    async fn start_batch_replies_accepted_and_runs() {
        let handler = handler();
        let request = StartBatchRequest {
            photos: vec![photo("a")],
            downloaded_count: 0,
            missing_count: 1,
        };
        let msg = Message::new("m1", MessageType::StartBatch, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_start_batch(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        assert_eq!(reply.msg_type, MessageType::OperationResult);
        let result: OperationResult = reply.parse_payload().unwrap().unwrap();
        assert!(result.accepted);

        // Wait for the spawned batch to finish.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if handler.store.get().global.complete {
                break;
            }
        }
        assert!(handler.store.get().global.complete);
    }

    #[tokio::test]
    async fn cancel_without_batch_is_rejected() {
        let handler = handler();
        let msg = Message::new::<()>("m1", MessageType::CancelBatch, None).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_cancel_batch(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        let result: OperationResult = reply.parse_payload().unwrap().unwrap();
        assert!(!result.accepted);
        assert!(result.detail.contains("no batch"));
    }

    #[tokio::test]
    async fn download_photo_unknown_id_is_not_found() {
        let handler = handler();
        let request = DownloadPhotoRequest {
            photo_id: "ghost".into(),
        };
        let msg = Message::new("m1", MessageType::DownloadPhoto, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_download_photo(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        assert_eq!(reply.error.as_ref().unwrap().code, ERR_NOT_FOUND);
    }

    #[tokio::test]
    async fn download_photo_known_id_is_accepted() {
        let handler = handler();
        handler.session.set_catalog(Vec::new(), vec![photo("a")]);

        let request = DownloadPhotoRequest {
            photo_id: "a".into(),
        };
        let msg = Message::new("m1", MessageType::DownloadPhoto, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_download_photo(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        let result: OperationResult = reply.parse_payload().unwrap().unwrap();
        assert!(result.accepted);

        // The spawned transfer eventually moves the photo to downloaded.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if handler.session.counts() == (1, 0) {
                break;
            }
        }
        assert_eq!(handler.session.counts(), (1, 0));
    }

    #[tokio::test]
    async fn batch_completion_clears_the_session() {
        let handler = handler();
        let request = StartBatchRequest {
            photos: vec![photo("a"), photo("b")],
            downloaded_count: 0,
            missing_count: 2,
        };
        let msg = Message::new("m1", MessageType::StartBatch, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_start_batch(sender, msg).await;
        let _ = next_envelope(&mut rx).await;

        // The split is dropped once the spawned run returns.
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if handler.session.counts() == (0, 0) {
                break;
            }
        }
        assert_eq!(handler.session.counts(), (0, 0));
        assert!(handler.session.find("a").is_none());
        assert!(handler.store.get().global.complete);
    }

    #[tokio::test]
    async fn engine_panic_still_ends_in_terminal_state() {
        let handler = handler_with_codec(Arc::new(PanickyCodec));
        let mut posed = photo("a");
        posed.pose = Some(Pose {
            latitude: 1.0,
            longitude: 2.0,
            heading: None,
            pitch: None,
            roll: None,
            altitude: None,
        });
        let request = StartBatchRequest {
            photos: vec![posed],
            downloaded_count: 0,
            missing_count: 1,
        };
        let msg = Message::new("m1", MessageType::StartBatch, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_start_batch(sender, msg).await;
        let _ = next_envelope(&mut rx).await;

        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            if handler.store.get().global.complete {
                break;
            }
        }
        let global = handler.store.get().global;
        assert!(global.complete, "a crashed run must still terminate");
        assert!(!global.in_progress, "a stuck inProgress would 409 every retrigger");
        assert!(global.error.is_some());
    }

    #[tokio::test]
    async fn download_photo_resolves_via_catalog() {
        let handler = handler().with_catalog(Arc::new(FixedCatalog {
            photos: vec![photo("c")],
        }));

        let request = DownloadPhotoRequest {
            photo_id: "c".into(),
        };
        let msg = Message::new("m1", MessageType::DownloadPhoto, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_download_photo(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        let result: OperationResult = reply.parse_payload().unwrap().unwrap();
        assert!(result.accepted);
    }

    #[tokio::test]
    async fn download_photo_missing_everywhere_is_not_found() {
        let handler = handler().with_catalog(Arc::new(FixedCatalog { photos: vec![] }));

        let request = DownloadPhotoRequest {
            photo_id: "ghost".into(),
        };
        let msg = Message::new("m1", MessageType::DownloadPhoto, Some(&request)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_download_photo(sender, msg).await;

        let reply = next_envelope(&mut rx).await;
        assert_eq!(reply.error.as_ref().unwrap().code, ERR_NOT_FOUND);
    }

    #[tokio::test]
    async fn hello_binds_the_progress_feed() {
        let handler = handler();
        let hello = ClientHello {
            name: "web-ui".into(),
            version: "1.0".into(),
        };
        let msg = Message::new("m1", MessageType::ClientHello, Some(&hello)).unwrap();
        let (sender, mut rx) = Sender::channel(16);

        handler.on_client_hello(sender, msg).await;

        // Accepted reply first.
        let reply = next_envelope(&mut rx).await;
        assert_eq!(reply.msg_type, MessageType::OperationResult);

        // A store mutation now reaches the socket as a progress message.
        handler
            .store
            .update(panovault_engine::ProgressUpdate::item_download("p1", 40));
        let progress = next_envelope(&mut rx).await;
        assert_eq!(progress.msg_type, MessageType::Progress);
    }
}
