//! Generation session for popup thumbnails.

use crate::cache::ThumbnailCache;
use crate::image::{ImageProcessor, ImageService};
use crate::models::{Config, PopupRequest, PopupVars};
use crate::sequence::IdSequence;
use crate::store::{FileStore, LocalFileStore};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

/// One generation pass: a thumbnail cache plus the id sequence its popups share.
pub struct App {
    cache: Arc<ThumbnailCache>,
    ids: Arc<IdSequence>,
    concurrency: usize,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub image: Box<dyn ImageService>,
    pub files: Box<dyn FileStore>,
}

impl App {
    /// Build an app from concrete service dependencies.
    pub fn with_services(config: &Config, services: AppServices) -> Self {
        Self {
            cache: Arc::new(ThumbnailCache::new(config, services.image, services.files)),
            ids: Arc::new(IdSequence::new()),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Construct an app backed by the local filesystem and the `image` crate.
    /// A relative source root is resolved against the working directory.
    pub fn new(config: &Config) -> Result<Self> {
        let mut config = config.clone();
        config.source_root = std::path::absolute(&config.source_root)?;
        info!(
            "Source root: {} (thumbnails under {}/)",
            config.source_root.display(),
            config.cache_dir
        );

        Ok(Self::with_services(
            &config,
            AppServices {
                image: Box::new(ImageProcessor::new()),
                files: Box::new(LocalFileStore::new()),
            },
        ))
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    pub fn ids(&self) -> &IdSequence {
        &self.ids
    }

    pub async fn process(&self, request: &PopupRequest) -> Result<PopupVars> {
        self.cache.process(request, &self.ids).await.map_err(|e| {
            error!("[{}] Popup failed: {}", request.path, e);
            e
        })
    }

    /// Process many popups concurrently. Results come back in request
    /// order; the first failure fails the batch.
    pub async fn process_batch(&self, requests: Vec<PopupRequest>) -> Result<Vec<PopupVars>> {
        let total = requests.len();
        info!(
            "Processing {} popups (concurrency {})",
            total, self.concurrency
        );

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let cache = self.cache.clone();
            let ids = self.ids.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Invariant(format!("Semaphore closed: {}", e)))?;
                let result = cache.process(&request, &ids).await.map_err(|e| {
                    error!("[{}] Popup failed: {}", request.path, e);
                    e
                });
                result.map(|vars| (index, vars))
            });
        }

        let mut results: Vec<Option<PopupVars>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, vars) = joined
                .map_err(|e| Error::Invariant(format!("Popup task join error: {}", e)))??;
            results[index] = Some(vars);
        }

        let popups = results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::Invariant("Popup task produced no result".to_string()))?;
        info!("Processed {} popups", popups.len());
        Ok(popups)
    }
}

#[cfg(test)]
mod tests {
    use super::{App, AppServices};
    use crate::image::MockImageProcessor;
    use crate::models::{Config, PopupRequest, ResizePolicy};
    use crate::store::MockFileStore;
    use crate::Error;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    fn build_test_app(store: &MockFileStore, images: MockImageProcessor, concurrency: usize) -> App {
        let config = Config {
            source_root: PathBuf::from("/blog/source"),
            policy: ResizePolicy::new(Some(50), Some(80)),
            concurrency,
            ..Config::default()
        };
        App::with_services(
            &config,
            AppServices {
                image: Box::new(images),
                files: Box::new(store.clone()),
            },
        )
    }

    fn store_with(names: &[&str]) -> MockFileStore {
        let store = MockFileStore::new();
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        for name in names {
            store.put_file(format!("/blog/source/images/{}", name), 200 * 1024, modified);
        }
        store
    }

    #[tokio::test]
    async fn test_sequential_popups_get_ids_in_order() {
        let store = store_with(&["a.png", "b.png", "c.png"]);
        let app = build_test_app(&store, MockImageProcessor::new(), 1);

        let mut ids = Vec::new();
        for name in ["a.png", "b.png", "c.png"] {
            let vars = app
                .process(&PopupRequest::new(format!("/images/{}", name), "50%", None))
                .await
                .unwrap();
            ids.push(vars.id);
        }

        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_batch_preserves_request_order() {
        let store = store_with(&["a.png", "b.png", "c.png", "d.png"]);
        let images = MockImageProcessor::new().with_store(store.clone());
        let app = build_test_app(&store, images.clone(), 3);

        let requests = vec![
            PopupRequest::new("/images/a.png", "50%", Some("A".to_string())),
            PopupRequest::new("/images/b.png", "90%", None),
            PopupRequest::new("/images/c.png", "25%", None),
            PopupRequest::new("/images/d.png", "75%", None),
        ];
        let popups = app.process_batch(requests).await.unwrap();

        let served: Vec<_> = popups.iter().map(|p| p.scaled_image.as_str()).collect();
        assert_eq!(
            served,
            vec![
                "/thumb/images/a.png",
                "/images/b.png",
                "/thumb/images/c.png",
                "/thumb/images/d.png",
            ]
        );
        assert_eq!(popups[0].title.as_deref(), Some("A"));
        assert_eq!(images.get_write_count(), 3);

        let mut ids: Vec<_> = popups.iter().map(|p| p.id.parse::<u64>().unwrap()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_images_writes_once() {
        let store = store_with(&["same.png"]);
        let images = MockImageProcessor::new().with_store(store.clone());
        let app = build_test_app(&store, images.clone(), 4);

        let requests = (0..6)
            .map(|_| PopupRequest::new("/images/same.png", "50%", None))
            .collect();
        let popups = app.process_batch(requests).await.unwrap();

        assert_eq!(popups.len(), 6);
        assert_eq!(images.get_write_count(), 1);
        assert_eq!(app.ids().issued(), 6);
    }

    #[tokio::test]
    async fn test_batch_fails_on_missing_image() {
        let store = store_with(&["a.png"]);
        let app = build_test_app(&store, MockImageProcessor::new(), 2);

        let requests = vec![
            PopupRequest::new("/images/a.png", "50%", None),
            PopupRequest::new("/images/missing.png", "50%", None),
        ];
        let err = app.process_batch(requests).await.unwrap_err();

        assert!(matches!(err, Error::SourceNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let app = build_test_app(&MockFileStore::new(), MockImageProcessor::new(), 2);
        assert!(app.process_batch(Vec::new()).await.unwrap().is_empty());
    }
}
