/// Application context and dependency injection
use crate::{
    account::AccountManager,
    analytics::AnalyticsService,
    auth::TokenIssuer,
    categories::CategoryManager,
    config::ServerConfig,
    db,
    error::ApiResult,
    images::{DiskUploadBackend, ImageManager, ImageStore},
    locations::LocationManager,
    rate_limit::RateLimiter,
    reports::ReportManager,
    votes::VoteManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub tokens: TokenIssuer,
    pub accounts: AccountManager,
    pub reports: ReportManager,
    pub categories: CategoryManager,
    pub locations: LocationManager,
    pub images: ImageManager,
    pub votes: VoteManager,
    pub analytics: AnalyticsService,
    pub image_store: Arc<ImageStore>,
    pub rate_limiter: RateLimiter,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.database).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Self::from_parts(config, pool).await
    }

    /// Wire the services around an existing pool (migrations already applied)
    pub async fn from_parts(config: ServerConfig, pool: SqlitePool) -> ApiResult<Self> {
        let upload_directory = &config.storage.upload_directory;
        if !upload_directory.exists() {
            tokio::fs::create_dir_all(upload_directory).await?;
        }

        let backend = Arc::new(DiskUploadBackend::new(upload_directory.clone()));
        let image_store = Arc::new(ImageStore::new(backend, config.storage.max_upload_bytes));

        let tokens = TokenIssuer::new(
            &config.authentication.jwt_secret,
            config.authentication.token_ttl,
        );
        let images = ImageManager::new(pool.clone());

        Ok(Self {
            tokens,
            accounts: AccountManager::new(pool.clone()),
            reports: ReportManager::new(pool.clone(), images.clone()),
            categories: CategoryManager::new(pool.clone()),
            locations: LocationManager::new(pool.clone()),
            images,
            votes: VoteManager::new(pool.clone()),
            analytics: AnalyticsService::new(pool.clone()),
            image_store,
            rate_limiter: RateLimiter::new(&config.rate_limit),
            config: Arc::new(config),
            db: pool,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
