//! Command execution context
//!
//! Wires config, store, ticket service, connectivity and the request
//! pipeline together so command handlers only deal with their own logic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;

use apspace::cache::SqliteStore;
use apspace::cas::{CasClient, TicketService};
use apspace::client::{HttpTransport, WsApi};
use apspace::config::Config;
use apspace::error::Result;
use apspace::network::{ConnectionType, NetworkMonitor, Runtime};
use apspace::session::Session;
use apspace::timetable::TimetableService;

use crate::cli::{GlobalOptions, OutputFormat};

/// Everything a command needs to talk to APSpace
pub struct CommandContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub tickets: Arc<TicketService>,
    pub api: WsApi,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Build the context and restore any session a previous login persisted.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the store cannot be opened.
    pub async fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_at(opts.config_ref())?;
        let store = Arc::new(open_store(opts)?);

        let cas = Arc::new(CasClient::new(config.cas_url.as_str())?);
        let tickets = Arc::new(
            TicketService::new(cas, store.clone(), Session::new(), config.cas_url.as_str())
                .with_timeout(config.ticket_timeout()),
        );
        if let Some(principal) = tickets.restore_session().await {
            debug!("Restored session for {}", principal.username);
        }

        let network = network_for(config.runtime, opts.offline);
        let transport = Arc::new(HttpTransport::new()?);
        let api = WsApi::new(
            transport,
            tickets.clone(),
            store.clone(),
            network,
            config.pipeline_settings(),
        );

        Ok(Self {
            config,
            store,
            tickets,
            api,
            format: opts.format,
        })
    }

    pub fn timetable(&self) -> TimetableService {
        TimetableService::new(self.api.clone(), self.config.timetable_url.as_str())
    }

    /// True when GETs are being answered from the local store only
    pub fn is_offline(&self) -> bool {
        self.api.network().is_device_offline()
    }
}

/// Open the persistent store at the override directory or the default one
pub fn open_store(opts: &GlobalOptions) -> Result<SqliteStore> {
    let store = match opts.cache_dir_ref() {
        Some(dir) => SqliteStore::open_at(Path::new(dir))?,
        None => SqliteStore::open()?,
    };
    Ok(store)
}

/// Store directory that [`open_store`] would use
pub fn store_dir(opts: &GlobalOptions) -> Result<PathBuf> {
    match opts.cache_dir_ref() {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(SqliteStore::cache_dir()?),
    }
}

/// Connectivity source for the configured runtime. `--offline` simulates a
/// device that has lost its connection.
pub fn network_for(runtime: Runtime, offline: bool) -> NetworkMonitor {
    if offline {
        let monitor = NetworkMonitor::new(Runtime::Device);
        monitor.update_connection_type(ConnectionType::None);
        monitor
    } else {
        NetworkMonitor::new(runtime)
    }
}
