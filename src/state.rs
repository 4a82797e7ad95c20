use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::build_pool;
use crate::services::guest_orders::BotDataStore;
use crate::services::pms::PmsClient;
use crate::services::room_types::RoomTypeTable;
use crate::services::walk_in::WalkInLedger;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: Option<PgPool>,
    pub pms: PmsClient,
    pub bot_store: BotDataStore,
    pub walk_ins: Arc<WalkInLedger>,
    pub room_types: Arc<RoomTypeTable>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let db_pool = build_pool(&config)?;
        if db_pool.is_none() {
            tracing::warn!("DATABASE_URL is not set; supplements, bot sessions and room acknowledgments are disabled");
        }

        let pms_timeout = Duration::from_secs(config.pms_timeout_seconds);
        let http_client = reqwest::Client::builder()
            .connect_timeout(pms_timeout)
            .timeout(pms_timeout)
            .build()?;

        let pms = PmsClient::new(
            http_client,
            config.pms_api_base_url.clone(),
            pms_timeout,
        );
        if !pms.is_configured() {
            tracing::warn!("PMS_API_BASE_URL is not set; booking lists will be empty");
        }

        let bot_store = BotDataStore::new(
            config.guest_orders_path(),
            config.user_profiles_path(),
            config.bot_store_cache_ttl_seconds,
        );
        let walk_ins = Arc::new(WalkInLedger::new(config.walk_in_ledger_path.clone()));
        let room_types = Arc::new(RoomTypeTable::load(config.room_type_table_path.as_deref()));

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            pms,
            bot_store,
            walk_ins,
            room_types,
        })
    }
}
