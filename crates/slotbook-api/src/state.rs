//! Application state wiring all services together.
//!
//! Services are generic over repository and gateway traits; AppState pins
//! them to the SQLite implementations and shares one drift counter set.

use std::path::PathBuf;
use std::sync::Arc;

use slotbook_core::drift::LedgerDrift;
use slotbook_core::scheduler::DailySlotScheduler;
use slotbook_core::service::appointment::{AppointmentService, AppointmentSettings};
use slotbook_core::service::expander::{ExpanderSettings, SlotExpander};
use slotbook_core::service::ledger::SlotLedger;
use slotbook_core::service::template::TemplateService;
use slotbook_infra::config::{database_url, load_booking_config, resolve_data_dir};
use slotbook_infra::sqlite::appointment::SqliteAppointmentRepository;
use slotbook_infra::sqlite::payment::StubPaymentGateway;
use slotbook_infra::sqlite::pool::DatabasePool;
use slotbook_infra::sqlite::slot::SqliteSlotRepository;
use slotbook_infra::sqlite::store::SqliteStoreRepository;
use slotbook_infra::sqlite::template::SqliteTemplateRepository;
use slotbook_types::config::BookingConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteSlotLedger = SlotLedger<SqliteSlotRepository>;

pub type ConcreteSlotExpander = SlotExpander<SqliteSlotRepository, SqliteTemplateRepository>;

pub type ConcreteTemplateService = TemplateService<SqliteTemplateRepository>;

pub type ConcreteAppointmentService =
    AppointmentService<SqliteAppointmentRepository, SqliteSlotRepository, StubPaymentGateway>;

pub type ConcreteScheduler =
    DailySlotScheduler<SqliteSlotRepository, SqliteTemplateRepository, SqliteStoreRepository>;

/// Shared application state holding all services.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ConcreteSlotLedger>,
    pub expander: Arc<ConcreteSlotExpander>,
    pub template_service: Arc<ConcreteTemplateService>,
    pub appointment_service: Arc<ConcreteAppointmentService>,
    pub scheduler: Arc<ConcreteScheduler>,
    pub stores: SqliteStoreRepository,
    pub payments: StubPaymentGateway,
    pub drift: Arc<LedgerDrift>,
    pub config: BookingConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_booking_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let slots = SqliteSlotRepository::new(db_pool.clone());
        let templates = SqliteTemplateRepository::new(db_pool.clone());
        let stores = SqliteStoreRepository::new(db_pool.clone());
        let payments = StubPaymentGateway::new(db_pool.clone());
        let drift = Arc::new(LedgerDrift::new());
        let expander_settings = ExpanderSettings::from(&config);

        // The scheduler owns its own expander; both report into the same drift counters.
        let scheduler = DailySlotScheduler::new(
            SlotExpander::new(
                slots.clone(),
                templates.clone(),
                Arc::clone(&drift),
                expander_settings,
            ),
            stores.clone(),
            &config.scheduler,
        )?;
        let expander = SlotExpander::new(
            slots.clone(),
            templates.clone(),
            Arc::clone(&drift),
            expander_settings,
        );

        let appointment_service = AppointmentService::new(
            SqliteAppointmentRepository::new(db_pool.clone()),
            SlotLedger::new(slots.clone(), Arc::clone(&drift)),
            payments.clone(),
            AppointmentSettings::from(&config),
        );

        Ok(Self {
            ledger: Arc::new(SlotLedger::new(slots, Arc::clone(&drift))),
            expander: Arc::new(expander),
            template_service: Arc::new(TemplateService::new(templates)),
            appointment_service: Arc::new(appointment_service),
            scheduler: Arc::new(scheduler),
            stores,
            payments,
            drift,
            config,
            data_dir,
            db_pool,
        })
    }

    /// Today's date in store-local time.
    pub fn local_today(&self) -> chrono::NaiveDate {
        slotbook_core::service::expander::local_date(self.config.local_offset(), chrono::Utc::now())
    }
}
