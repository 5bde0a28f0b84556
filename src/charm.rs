//! The livepatch charm: turns config and relation data into a Pebble plan for the server

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use failure::Fail;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::config::{get_bool, get_str, to_env_vars, ConfigData};
use crate::config_migration::{migrate, parse};
use crate::contracts::{ContractsClient, ContractsEndpoint, HttpContractsClient, ProxySettings};
use crate::database::{
    check_exclusive, check_single_database, database_requested, dsn_from_provider_data,
    legacy_primary_uri, request_database, DATABASE_RELATION, DATABASE_RELATION_LEGACY,
};
use crate::error::CharmError;
use crate::gateway_route::{valid_fqdn, GatewayRouteRequirer, RouteRequest};
use crate::model::{Model, Relation, RelationEvent, RelationEventKind, Status};
use crate::pebble::{Check, Container, HttpCheck, Layer, Override, Service, Startup};
use crate::state::{State, PEER_RELATION};

pub const WORKLOAD_CONTAINER: &str = "livepatch";
pub const SCHEMA_UPGRADE_CONTAINER: &str = "livepatch-schema-upgrade";
pub const LIVEPATCH_SERVICE: &str = "livepatch";
pub const LAYER_LABEL: &str = "livepatch";
pub const SERVER_PORT: u16 = 8080;

pub const INGRESS_RELATION: &str = "ingress";
pub const LOG_PROXY_RELATION: &str = "log-proxy";
pub const METRICS_RELATION: &str = "metrics-endpoint";
pub const AIRGAPPED_RELATION: &str = "pro-airgapped-server";
pub const CVE_CATALOG_RELATION: &str = "cve-catalog";

pub const LOG_FILE: &str = "/var/log/livepatch";
pub const LOGROTATE_CONFIG_PATH: &str = "/etc/logrotate.d/livepatch";
pub const SCHEMA_TOOL: &str = "/usr/local/bin/livepatch-schema-tool";
pub const TRUSTED_CA_PATH: &str = "/usr/local/share/ca-certificates/trusted-contracts.ca.crt";

const LOGROTATE_CONFIG: &str = "/var/log/livepatch {
    rotate 3
    daily
    compress
    delaycompress
    missingok
    notifempty
    size 10M
}
";

/// Exit code of `livepatch-schema-tool check` when migrations are pending
const MIGRATION_REQUIRED_EXIT_CODE: i32 = 2;

const TOKEN_NOT_SET: &str = "✘ patch-sync token not set, run get-resource-token action";
const INVALID_HOSTNAME: &str = "✘ external_hostname is not a valid domain";
const INVALID_CONTRACTS_CA: &str = "✘ contracts.ca is not valid base64";

/// Settings that must be set before the server can start, and the message shown otherwise
const REQUIRED_SETTINGS: &[(&str, &str)] =
    &[("server.url-template", "✘ server.url-template config not set")];

/// A trigger delivered by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConfigChanged,
    Start,
    Stop,
    UpdateStatus,
    LeaderElected,

    /// The named container's Pebble is up
    PebbleReady(String),

    Relation(RelationEvent),
}

/// How an event was dealt with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,

    /// Not possible yet; the host should deliver the event again later
    Defer,
}

/// An operator-invoked action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Restart,
    SchemaUpgrade,
    SchemaVersion,
    GetResourceToken { contract_token: String },
    EmitUpdatedConfig { config_file: String },
}

pub type ActionResults = Map<String, Value>;

/// The action failed; the message is shown to the operator
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
#[fail(display = "{}", _0)]
pub struct ActionFailed(pub String);

impl From<CharmError> for ActionFailed {
    fn from(err: CharmError) -> Self {
        ActionFailed(err.to_string())
    }
}

fn results(key: &str, value: Value) -> ActionResults {
    let mut results = ActionResults::new();
    results.insert(key.into(), value);
    results
}

/// The charm for one unit, bound to the host's model
pub struct LivepatchCharm<M: Model> {
    model: M,
    contracts: Box<dyn ContractsClient>,
}

impl<M: Model> LivepatchCharm<M> {
    pub fn new(model: M) -> Self {
        Self::with_contracts_client(model, Box::new(HttpContractsClient))
    }

    pub fn with_contracts_client(model: M, contracts: Box<dyn ContractsClient>) -> Self {
        Self { model, contracts }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Handle one event
    ///
    /// `Err` is reserved for problems that must stop the unit, such as both database relations
    /// being present at once.
    pub fn handle(&self, event: &Event) -> Result<Outcome, CharmError> {
        debug!(?event, "Handling event");

        match event {
            Event::ConfigChanged | Event::Start | Event::LeaderElected | Event::PebbleReady(_) => {
                self.reconcile()
            }
            Event::UpdateStatus => self.update_status(),
            Event::Stop => self.stop(),
            Event::Relation(event) => self.relation_event(event),
        }
    }

    fn relation_event(&self, event: &RelationEvent) -> Result<Outcome, CharmError> {
        match event.relation_name.as_str() {
            DATABASE_RELATION => self.database_event(event),
            DATABASE_RELATION_LEGACY => self.legacy_database_event(event),
            INGRESS_RELATION => {
                match self.ingress() {
                    Ok(ingress) => {
                        for notification in ingress.handle(&self.model, event)? {
                            info!(?notification, "Ingress");
                        }
                    }
                    // reconcile reports the bad hostname
                    Err(CharmError::DataValidation(err)) => debug!("Ingress not published: {}", err),
                    Err(err) => return Err(err),
                }
                self.reconcile()
            }
            PEER_RELATION | LOG_PROXY_RELATION | METRICS_RELATION | AIRGAPPED_RELATION
            | CVE_CATALOG_RELATION => self.reconcile(),
            other => {
                debug!(relation = other, "Ignoring event for unknown relation");
                Ok(Outcome::Complete)
            }
        }
    }

    /// Bring the workload in line with config, relations and peer state
    fn reconcile(&self) -> Result<Outcome, CharmError> {
        let state = State::new(&self.model);
        if !state.is_ready() {
            warn!("State is not ready");
            self.model
                .set_status(Status::waiting("Waiting for peer relation to be established."));
            return Ok(Outcome::Defer);
        }

        check_single_database(&self.model)?;

        let workload = self.model.container(WORKLOAD_CONTAINER)?;
        if workload.can_connect() {
            workload.push(LOGROTATE_CONFIG_PATH, LOGROTATE_CONFIG.as_bytes(), true)?;
        }

        let config = self.model.config();
        if let Some(hostname) = get_str(&config, "external_hostname") {
            if let Err(reason) = valid_fqdn(hostname) {
                warn!(hostname, "{}", reason);
                self.model.set_status(Status::blocked(INVALID_HOSTNAME));
                return Ok(Outcome::Complete);
            }
        }
        self.ingress()?;
        self.publish_scrape_jobs()?;

        let dsn = match state.dsn() {
            Some(dsn) => dsn,
            None => {
                info!("Waiting for postgres connection string");
                self.model
                    .set_status(Status::blocked("Waiting for postgres relation to be established."));
                return Ok(Outcome::Defer);
            }
        };

        let schema = self.model.container(SCHEMA_UPGRADE_CONTAINER)?;
        if !schema.can_connect() {
            error!("Cannot connect to the schema upgrade container");
            self.model
                .set_status(Status::waiting("Waiting to connect - schema container."));
            return Ok(Outcome::Defer);
        }

        match self.migration_is_required(&*schema, &dsn) {
            Ok(false) => {}
            Ok(true) => {
                if let Err(err) = self.schema_upgrade(&*schema, &dsn) {
                    error!("Schema migration failed: {}", err);
                    self.model.set_status(Status::waiting("Schema migration failed"));
                    return Ok(Outcome::Defer);
                }
            }
            Err(err) => {
                error!("Failed to determine if schema upgrade required: {}", err);
                self.model
                    .set_status(Status::waiting("Schema version check failed"));
                return Ok(Outcome::Defer);
            }
        }

        let token = sync_token(&config, &state);
        if !get_bool(&config, "server.is-hosted") && token.is_none() {
            self.model.set_status(Status::blocked(TOKEN_NOT_SET));
            return Ok(Outcome::Complete);
        }

        for (setting, message) in REQUIRED_SETTINGS {
            if get_str(&config, setting).is_none() {
                warn!(setting, "Required setting missing");
                self.model.set_status(Status::blocked(*message));
                return Ok(Outcome::Complete);
            }
        }

        if !workload.can_connect() {
            info!("Workload container not ready");
            self.model
                .set_status(Status::waiting("Waiting to connect - workload container"));
            return Ok(Outcome::Defer);
        }

        let ca = match contracts_ca(&config) {
            Ok(ca) => ca,
            Err(err) => {
                error!("{}", err);
                self.model.set_status(Status::blocked(INVALID_CONTRACTS_CA));
                return Ok(Outcome::Complete);
            }
        };
        if let Some(cert) = ca {
            self.push_contracts_ca(&*workload, &cert)?;
        }

        let environment = self.environment(&config, &dsn, token.as_ref().map(String::as_str));
        workload.add_layer(LAYER_LABEL, &layer(environment), true)?;

        if workload.service(LIVEPATCH_SERVICE)?.is_running() {
            info!("Replanning livepatch service");
            workload.replan()?;
        } else {
            info!("Starting livepatch service");
            workload.start(&[LIVEPATCH_SERVICE])?;
        }

        self.model.set_status(Status::active());
        Ok(Outcome::Complete)
    }

    fn update_status(&self) -> Result<Outcome, CharmError> {
        let workload = self.model.container(WORKLOAD_CONTAINER)?;
        if !workload.can_connect() {
            debug!("Cannot connect to workload container");
            return Ok(Outcome::Complete);
        }

        if !workload.plan()?.services.contains_key(LIVEPATCH_SERVICE) {
            info!("Livepatch service is not in the plan yet");
            return Ok(Outcome::Complete);
        }

        if workload.service(LIVEPATCH_SERVICE)?.is_running() {
            self.model.set_status(Status::active());
        }
        Ok(Outcome::Complete)
    }

    fn stop(&self) -> Result<Outcome, CharmError> {
        let workload = self.model.container(WORKLOAD_CONTAINER)?;
        if !workload.can_connect() {
            return Ok(Outcome::Complete);
        }

        match workload.service(LIVEPATCH_SERVICE) {
            Ok(service) if service.is_running() => workload.stop(&[LIVEPATCH_SERVICE])?,
            Ok(_) => {}
            Err(err) => {
                warn!("Livepatch service not found: {}", err);
                return Ok(Outcome::Complete);
            }
        }

        self.model.set_status(Status::waiting("service stopped"));
        Ok(Outcome::Complete)
    }

    /// Stop the service if it runs here, without restarting it
    fn stop_running_service(&self, workload: &dyn Container) -> Result<(), CharmError> {
        if !workload.can_connect() {
            return Ok(());
        }
        match workload.service(LIVEPATCH_SERVICE) {
            Ok(service) if service.is_running() => {
                info!("Stopping livepatch service");
                workload.stop(&[LIVEPATCH_SERVICE])
            }
            Ok(_) => Ok(()),
            Err(err) => {
                debug!("Nothing to stop: {}", err);
                Ok(())
            }
        }
    }

    fn find_relation(&self, name: &str, id: u32) -> Option<Relation> {
        self.model.relations(name).into_iter().find(|r| r.id == id)
    }

    fn database_event(&self, event: &RelationEvent) -> Result<Outcome, CharmError> {
        match event.kind {
            RelationEventKind::Broken => return self.database_removed(),
            RelationEventKind::Departed => return Ok(Outcome::Complete),
            _ => {}
        }

        check_exclusive(&self.model, DATABASE_RELATION)?;

        let state = State::new(&self.model);
        if !state.is_ready() {
            warn!("State is not ready, deferring database event");
            return Ok(Outcome::Defer);
        }

        let relation = match self.find_relation(DATABASE_RELATION, event.relation_id) {
            Some(relation) => relation,
            None => return Ok(Outcome::Complete),
        };

        match event.kind {
            RelationEventKind::Changed => {
                if self.model.is_leader() {
                    match dsn_from_provider_data(&relation.remote_app_data) {
                        Some(dsn) => {
                            info!("Received database credentials");
                            state.set_dsn(Some(dsn.as_str()))?;
                        }
                        None => {
                            info!("Database relation data is not complete yet");
                            return Ok(Outcome::Defer);
                        }
                    }
                }
                self.reconcile()
            }
            _ => {
                if self.model.is_leader() {
                    request_database(&self.model, &relation)?;
                }
                Ok(Outcome::Complete)
            }
        }
    }

    fn legacy_database_event(&self, event: &RelationEvent) -> Result<Outcome, CharmError> {
        match event.kind {
            RelationEventKind::Broken => return self.database_removed(),
            RelationEventKind::Departed => return Ok(Outcome::Complete),
            _ => {}
        }

        check_exclusive(&self.model, DATABASE_RELATION_LEGACY)?;

        let state = State::new(&self.model);
        if !state.is_ready() {
            warn!("State is not ready, deferring legacy database event");
            return Ok(Outcome::Defer);
        }

        let relation = match self.find_relation(DATABASE_RELATION_LEGACY, event.relation_id) {
            Some(relation) => relation,
            None => return Ok(Outcome::Complete),
        };

        match event.kind {
            RelationEventKind::Joined => {
                warn!("The pgsql interface is deprecated, relate to `database` instead");
                if self.model.is_leader() {
                    request_database(&self.model, &relation)?;
                } else if !database_requested(&self.model, &relation) {
                    return Ok(Outcome::Defer);
                }
                Ok(Outcome::Complete)
            }
            RelationEventKind::Changed => {
                if !database_requested(&self.model, &relation) {
                    debug!("Database not requested yet, ignoring legacy database change");
                    return Ok(Outcome::Complete);
                }
                if self.model.is_leader() {
                    self.model.set_status(Status::waiting(
                        "(legacy database relation) Updating application database connection...",
                    ));
                    if let Some(uri) = legacy_primary_uri(&relation)? {
                        state.set_dsn(Some(uri.as_str()))?;
                    }
                }
                self.reconcile()
            }
            _ => Ok(Outcome::Complete),
        }
    }

    fn database_removed(&self) -> Result<Outcome, CharmError> {
        let workload = self.model.container(WORKLOAD_CONTAINER)?;
        self.stop_running_service(&*workload)?;

        let state = State::new(&self.model);
        if self.model.is_leader() && state.is_ready() {
            state.set_dsn(None)?;
        }

        self.model
            .set_status(Status::blocked("Database connection removed"));
        Ok(Outcome::Complete)
    }

    fn ingress(&self) -> Result<GatewayRouteRequirer, CharmError> {
        let config = self.model.config();
        let request = RouteRequest {
            name: Some(self.model.app_name()),
            model: Some(self.model.model_name()),
            port: Some(i64::from(SERVER_PORT)),
            hostname: get_str(&config, "external_hostname").map(String::from),
            paths: vec![],
        };
        GatewayRouteRequirer::with_requirements(&self.model, INGRESS_RELATION, request)
    }

    fn publish_scrape_jobs(&self) -> Result<(), CharmError> {
        if !self.model.is_leader() {
            return Ok(());
        }

        let jobs = json!([{"static_configs": [{"targets": [format!("*:{}", SERVER_PORT)]}]}]);
        let jobs = serde_json::to_string(&jobs)?;

        for relation in self.model.relations(METRICS_RELATION) {
            if relation.local_app_data.get("scrape_jobs") == Some(&jobs) {
                continue;
            }
            let mut data = relation.local_app_data.clone();
            data.insert("scrape_jobs".into(), jobs.clone());
            self.model.update_app_data(relation.id, data)?;
        }
        Ok(())
    }

    fn push_contracts_ca(&self, workload: &dyn Container, cert: &[u8]) -> Result<(), CharmError> {
        info!(path = TRUSTED_CA_PATH, "Installing contracts CA certificate");
        workload.push(TRUSTED_CA_PATH, cert, true)?;
        workload.exec(&["update-ca-certificates", "--fresh"])?;
        Ok(())
    }

    /// `scheme://hostname:port` of the first airgapped contracts server unit to publish all three
    fn airgapped_contracts_url(&self) -> Option<String> {
        let relation = self.model.relation(AIRGAPPED_RELATION)?;
        relation.units.iter().find_map(|unit| {
            let data = relation.unit_data(unit)?;
            let field = |key: &str| data.get(key).filter(|v| !v.is_empty());
            Some(format!(
                "{}://{}:{}",
                field("scheme")?,
                field("hostname")?,
                field("port")?
            ))
        })
    }

    fn cve_catalog_url(&self) -> Option<String> {
        self.model
            .relation(CVE_CATALOG_RELATION)?
            .remote_app_data
            .get("url")
            .filter(|u| !u.is_empty())
            .cloned()
    }

    /// Environment of the server process
    fn environment(&self, config: &ConfigData, dsn: &str, token: Option<&str>) -> BTreeMap<String, String> {
        let mut env = to_env_vars(config);

        env.insert("LP_SERVER_IS_LEADER".into(), self.model.is_leader().to_string());
        env.insert("LP_DATABASE_CONNECTION_STRING".into(), dsn.into());
        env.insert("LP_SERVER_SERVER_ADDRESS".into(), format!(":{}", SERVER_PORT));

        if let Some(token) = token {
            env.insert("LP_PATCH_SYNC_TOKEN".into(), token.into());
        }
        if get_bool(config, "patch-sync.enabled") {
            env.insert("LP_PATCH_SYNC_ID".into(), self.model.model_uuid());
        }
        if get_str(config, "patch-storage.type") == Some("postgres") {
            let conn = get_str(config, "patch-storage.postgres-connection-string").unwrap_or(dsn);
            env.insert(
                "LP_PATCH_STORAGE_POSTGRES_CONNECTION_STRING".into(),
                conn.into(),
            );
        }

        if let Some(url) = self.airgapped_contracts_url() {
            info!(url = %url, "Using airgapped contracts server");
            env.insert("LP_CONTRACTS_URL".into(), url);
            env.insert("LP_CONTRACTS_ENABLED".into(), "true".into());
            let sync = get_bool(config, "patch-sync.enabled") && token.is_some();
            env.insert("LP_PATCH_SYNC_ENABLED".into(), sync.to_string());
        }

        match self.cve_catalog_url() {
            Some(url) => {
                env.insert("LP_CVE_SYNC_ENABLED".into(), "true".into());
                env.insert("LP_CVE_SYNC_SOURCE_URL".into(), url);
            }
            None => {
                env.insert("LP_CVE_SYNC_ENABLED".into(), "false".into());
            }
        }

        env.retain(|_, v| !v.is_empty());
        env
    }

    /// Whether `check` reports pending migrations
    fn migration_is_required(&self, schema: &dyn Container, dsn: &str) -> Result<bool, CharmError> {
        if !schema.exists(SCHEMA_TOOL)? {
            return Err(CharmError::FileNotFound(SCHEMA_TOOL.into()));
        }

        match schema.exec(&[SCHEMA_TOOL, "check", "--db", dsn]) {
            Ok(_) => {
                info!("Schema is up to date");
                Ok(false)
            }
            Err(CharmError::Exec(err)) if err.exit_code == MIGRATION_REQUIRED_EXIT_CODE => {
                info!("Schema migrations pending");
                Ok(true)
            }
            Err(err) => Err(err),
        }
    }

    fn schema_upgrade(&self, schema: &dyn Container, dsn: &str) -> Result<(), CharmError> {
        info!("Attempting schema upgrade");
        self.model
            .set_status(Status::waiting("pg connection successful, attempting upgrade"));

        if !schema.exists(SCHEMA_TOOL)? {
            return Err(CharmError::FileNotFound(SCHEMA_TOOL.into()));
        }

        match schema.exec(&[SCHEMA_TOOL, "upgrade", "--db", dsn]) {
            Ok(output) => {
                for line in output.stdout.lines() {
                    info!("{}", line);
                }
                self.model.set_status(Status::waiting("Schema migration done"));
                Ok(())
            }
            Err(CharmError::Exec(err)) => {
                for line in err.stderr.lines() {
                    error!("{}", line);
                }
                Err(CharmError::Exec(err))
            }
            Err(err) => Err(err),
        }
    }

    /// Run an operator action
    pub fn run_action(&self, action: &Action) -> Result<ActionResults, ActionFailed> {
        info!(?action, "Running action");

        match action {
            Action::Restart => self.restart_action(),
            Action::SchemaUpgrade => self.schema_upgrade_action(),
            Action::SchemaVersion => self.schema_version_action(),
            Action::GetResourceToken { contract_token } => {
                self.get_resource_token_action(contract_token)
            }
            Action::EmitUpdatedConfig { config_file } => emit_updated_config(config_file),
        }
    }

    fn restart_action(&self) -> Result<ActionResults, ActionFailed> {
        let workload = self.model.container(WORKLOAD_CONTAINER)?;
        self.stop_running_service(&*workload)?;
        if self.reconcile()? == Outcome::Defer {
            return Err(ActionFailed(format!(
                "restart incomplete: {}",
                self.model.status()
            )));
        }
        Ok(ActionResults::new())
    }

    fn schema_upgrade_action(&self) -> Result<ActionResults, ActionFailed> {
        let failed = |reason: String| ActionFailed(format!("schema migration failed: {}", reason));

        let state = State::new(&self.model);
        if !state.is_ready() {
            warn!("State is not ready");
            return Ok(ActionResults::new());
        }

        let dsn = state
            .dsn()
            .ok_or_else(|| failed("database connection not set".into()))?;
        let schema = self.model.container(SCHEMA_UPGRADE_CONTAINER)?;
        if !schema.can_connect() {
            return Err(failed("cannot connect to the schema upgrade container".into()));
        }

        self.schema_upgrade(&*schema, &dsn)
            .map_err(|err| failed(err.to_string()))?;
        Ok(ActionResults::new())
    }

    fn schema_version_action(&self) -> Result<ActionResults, ActionFailed> {
        let failed =
            |reason: String| ActionFailed(format!("schema version check failed: {}", reason));

        let state = State::new(&self.model);
        if !state.is_ready() {
            warn!("State is not ready");
            return Ok(ActionResults::new());
        }

        let dsn = state
            .dsn()
            .ok_or_else(|| failed("database connection not set".into()))?;
        let schema = self.model.container(SCHEMA_UPGRADE_CONTAINER)?;
        if !schema.can_connect() {
            return Err(failed("cannot connect to the schema upgrade container".into()));
        }

        let required = self
            .migration_is_required(&*schema, &dsn)
            .map_err(|err| failed(err.to_string()))?;
        Ok(results("migration-required", Value::Bool(required)))
    }

    fn get_resource_token_action(&self, contract_token: &str) -> Result<ActionResults, ActionFailed> {
        let error = |reason: &str| -> Result<ActionResults, ActionFailed> {
            Ok(results(
                "error",
                Value::String(format!("cannot fetch the resource token: {}", reason)),
            ))
        };

        if !self.model.is_leader() {
            return error("unit is not the leader");
        }

        let state = State::new(&self.model);
        if !state.is_ready() {
            return error("peer relation not ready");
        }

        let config = self.model.config();
        if get_str(&config, "patch-sync.token").is_some() {
            return Ok(results(
                "error",
                Value::String(
                    "patch-sync.token is already set. It should be unset before setting a resource token"
                        .into(),
                ),
            ));
        }

        if contract_token.is_empty() {
            return error("no contract token provided");
        }

        let mut endpoint =
            ContractsEndpoint::new(get_str(&config, "contracts.url").unwrap_or_default());
        endpoint.proxies = ProxySettings::from_env();
        endpoint.ca_certificate = contracts_ca(&config)?;

        let machine_token = match self.contracts.machine_token(&endpoint, contract_token) {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to fetch the machine token: {}", err);
                return error("failed to fetch the machine token");
            }
        };

        let resource_token = match self.contracts.resource_token(&endpoint, &machine_token) {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to fetch the resource token: {}", err);
                return error("failed to fetch the resource token");
            }
        };

        state.set_resource_token(Some(resource_token.as_str()))?;
        self.reconcile()?;
        Ok(results("result", Value::String("resource token set".into())))
    }
}

/// The patch-sync token: the config option wins over one fetched from the contracts server
fn sync_token<M: Model + ?Sized>(config: &ConfigData, state: &State<M>) -> Option<String> {
    get_str(config, "patch-sync.token")
        .map(String::from)
        .or_else(|| state.resource_token())
}

/// Decoded `contracts.ca`, if set
fn contracts_ca(config: &ConfigData) -> Result<Option<Vec<u8>>, CharmError> {
    match get_str(config, "contracts.ca") {
        Some(encoded) => Ok(Some(STANDARD.decode(encoded.trim())?)),
        None => Ok(None),
    }
}

/// The Pebble layer running the server with the given environment
pub fn layer(environment: BTreeMap<String, String>) -> Layer {
    let mut layer = Layer {
        summary: Some("Livepatch Service".into()),
        description: Some("Pebble config layer for livepatch".into()),
        ..Default::default()
    };

    layer.services.insert(
        LIVEPATCH_SERVICE.into(),
        Service {
            override_: Override::Merge,
            summary: Some("Livepatch Service".into()),
            description: Some("Pebble config layer for livepatch".into()),
            startup: Some(Startup::Disabled),
            command: Some(format!(
                "sh -c '/usr/local/bin/livepatch-server | tee {}'",
                LOG_FILE
            )),
            environment,
        },
    );

    layer.checks.insert(
        "livepatch-check".into(),
        Check {
            override_: Override::Replace,
            period: Some("1m".into()),
            http: Some(HttpCheck {
                url: format!("http://localhost:{}/debug/info", SERVER_PORT),
            }),
        },
    );

    layer
}

fn emit_updated_config(config_file: &str) -> Result<ActionResults, ActionFailed> {
    let config = parse(config_file.trim())?;
    let result = migrate(&config)
        .map_err(|err| ActionFailed(format!("Failed to map old config to new config: {}", err)))?;

    let result = serde_json::to_value(&result).map_err(CharmError::from)?;
    Ok(results("result", result))
}
