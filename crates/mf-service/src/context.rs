//! Application context.
//!
//! [`AppContext`] holds the shared infrastructure every entry point needs:
//! configuration, the SQLite store, discovered tools, the event bus, the
//! admission controller and the pipeline context built on top of them. It is
//! cheap to clone; everything lives behind `Arc`s.

use std::sync::Arc;

use mf_av::ToolRegistry;
use mf_core::config::Config;
use mf_core::events::EventBus;
use mf_db::{DbPool, SqliteStore};
use mf_pipeline::{
    FfmpegEngine, MessagingEndpoint, ObjectStorage, PipelineContext, PipelineSettings,
    RemoteFetcher, TaskAdmission, TransformEngine,
};

use crate::access::AccessPolicy;
use crate::gofile::GofileClient;
use crate::http::HttpFetcher;

/// The external collaborators the pipeline talks to.
pub struct Collaborators {
    pub endpoint: Arc<dyn MessagingEndpoint>,
    pub fetcher: Arc<dyn RemoteFetcher>,
    pub storage: Arc<dyn ObjectStorage>,
    pub engine: Arc<dyn TransformEngine>,
}

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub tools: Arc<ToolRegistry>,
    pub events: Arc<EventBus>,
    pub admission: Arc<TaskAdmission>,
    pub pipeline: PipelineContext,
    pub access: AccessPolicy,
}

impl AppContext {
    /// Wire a context from an open pool and explicit collaborators.
    pub fn new(config: Config, pool: DbPool, collaborators: Collaborators) -> Self {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        Self::with_tools(config, pool, tools, collaborators)
    }

    /// Wire a context with the production collaborators: ffmpeg as the
    /// engine, HTTP for link inputs and gofile for object storage. Only the
    /// messaging endpoint is left to the caller.
    pub fn production(
        config: Config,
        endpoint: Arc<dyn MessagingEndpoint>,
    ) -> mf_core::Result<Self> {
        let db_path = config.storage.db_path.to_string_lossy().to_string();
        if let Some(parent) = config.storage.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let pool = mf_db::init_pool(&db_path)?;

        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let collaborators = Collaborators {
            endpoint,
            fetcher: Arc::new(HttpFetcher::new()),
            storage: Arc::new(GofileClient::new(&config.upload)),
            engine: Arc::new(FfmpegEngine::new(tools.clone(), config.tools.threads)),
        };
        Ok(Self::with_tools(config, pool, tools, collaborators))
    }

    fn with_tools(
        config: Config,
        pool: DbPool,
        tools: Arc<ToolRegistry>,
        collaborators: Collaborators,
    ) -> Self {
        let store = Arc::new(SqliteStore::new(pool));
        let events = Arc::new(EventBus::default());
        let admission = Arc::new(TaskAdmission::new(store.clone(), store.clone()));

        let pipeline = PipelineContext {
            sessions: store.clone(),
            tasks: store.clone(),
            admission: admission.clone(),
            endpoint: collaborators.endpoint,
            fetcher: collaborators.fetcher,
            storage: collaborators.storage,
            engine: collaborators.engine,
            events: events.clone(),
            settings: PipelineSettings::from_config(&config),
        };

        Self {
            access: AccessPolicy::from_config(&config.access),
            config: Arc::new(config),
            store,
            tools,
            events,
            admission,
            pipeline,
        }
    }
}
