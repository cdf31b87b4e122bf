use std::fs;

use super::*;

pub struct SyncOptions {
    pub endpoints: EndpointsConfig,
    pub enrichments: EnrichmentsConfig,
    pub schema_sql: String,
    pub output_dir: PathBuf,
    pub db_name: String,
    pub skip_raw: bool,
    /// Endpoint names to sync; empty means every configured endpoint.
    pub only: Vec<String>,
}

impl SyncOptions {
    pub fn from_args(args: &SyncArgs) -> Result<Self> {
        let endpoints = EndpointsConfig::load(&args.config)?;

        let enrichments = if args.enrichments_config.exists() {
            EnrichmentsConfig::load(&args.enrichments_config)?
        } else {
            warn!(
                path = %args.enrichments_config.display(),
                "enrichments config missing, bio classification limited to defaults"
            );
            EnrichmentsConfig::default()
        };

        let schema_sql = match &args.schema {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read schema {}", path.display()))?,
            None => SCHEMA_SQL.to_string(),
        };

        Ok(Self {
            endpoints,
            enrichments,
            schema_sql,
            output_dir: args.output_dir.clone(),
            db_name: args.db_name.clone(),
            skip_raw: args.skip_raw,
            only: args.endpoints.clone(),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.output_dir.join(&self.db_name)
    }
}

#[derive(Debug)]
pub struct SyncSummary {
    pub stats: BuildStats,
    pub table_counts: BTreeMap<String, i64>,
    pub validation: ValidationReport,
    pub manifest_path: Option<PathBuf>,
}

pub struct Pipeline {
    options: SyncOptions,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(options: SyncOptions, cancel: CancellationToken) -> Self {
        Self { options, cancel }
    }

    /// Runs every stage in order. Endpoint, enrichment, validation and
    /// packaging problems land in `stats.errors`; only failures that leave
    /// nothing to work with (config, database, schema) come back as `Err`.
    pub async fn run(&self) -> Result<SyncSummary> {
        let mut stats = BuildStats::start(Utc::now());
        ensure_directory(&self.options.output_dir)?;
        let db_path = self.options.db_path();
        info!(db_path = %db_path.display(), skip_raw = self.options.skip_raw, "starting sync");

        let (table_counts, validation) = {
            let mut store = Store::open(&db_path)?;
            self.init_database(&store)?;
            self.load_static_data(&mut store, &mut stats);

            if self.options.skip_raw {
                info!("skipping API fetch (--skip-raw)");
            } else {
                self.fetch_all_endpoints(&mut store, &mut stats).await?;
            }

            let enrichment = EnrichmentEngine::new(&self.options.enrichments).run(&mut store);
            stats.extend_errors(enrichment.errors);

            let table_counts = self.record_sync_meta(&store)?;
            let validation = self.validate(&store, &mut stats);
            store.vacuum()?;
            (table_counts, validation)
        };

        stats.finish(Utc::now());
        let manifest_path = self.package(&db_path, table_counts.clone(), &mut stats);

        Ok(SyncSummary {
            stats,
            table_counts,
            validation,
            manifest_path,
        })
    }

    fn init_database(&self, store: &Store) -> Result<()> {
        info!("initializing database schema");
        store.init_schema(&self.options.schema_sql)?;
        store.set_meta("dataSource", DATA_SOURCE)?;
        store.set_meta("dataSourceType", DATA_SOURCE_TYPE)?;
        store.set_meta("schemaVersion", SCHEMA_VERSION)?;
        Ok(())
    }

    fn load_static_data(&self, store: &mut Store, stats: &mut BuildStats) {
        let (counts, errors) = load_static_sources(store, &self.options.endpoints.static_sources);
        for (table, count) in counts {
            stats.record_endpoint(&format!("static_{table}"), EndpointStats::success(count, 0));
        }
        stats.extend_errors(errors);
    }

    async fn fetch_all_endpoints(&self, store: &mut Store, stats: &mut BuildStats) -> Result<()> {
        let config = &self.options.endpoints;
        for name in &self.options.only {
            if !config.endpoints.iter().any(|endpoint| &endpoint.name == name) {
                stats.record_error(format!("endpoint {name} is not configured"));
            }
        }

        let fetcher = Fetcher::new(&config.base_url, &config.fetch, self.cancel.clone())?;
        let retry = fetcher.retry_policy();
        info!(
            base_url = %config.base_url,
            max_retries = retry.max_retries,
            base_delay_ms = retry.base_delay.as_millis() as u64,
            "fetching endpoints"
        );

        for endpoint in config.selected_endpoints(&self.options.only) {
            if self.cancel.is_cancelled() {
                stats.record_error(format!(
                    "sync cancelled before endpoint {}; remaining endpoints skipped",
                    endpoint.name
                ));
                break;
            }
            let endpoint_stats = self.sync_endpoint(&fetcher, store, endpoint).await;
            stats.record_endpoint(&endpoint.name, endpoint_stats);
        }

        Ok(())
    }

    async fn sync_endpoint(
        &self,
        fetcher: &Fetcher,
        store: &mut Store,
        endpoint: &EndpointDescriptor,
    ) -> EndpointStats {
        let mapper = match mapper_for(&endpoint.name) {
            Ok(mapper) => mapper,
            Err(err) => {
                error!(endpoint = %endpoint.name, error = %err, "skipping endpoint");
                return EndpointStats::error(err.to_string());
            }
        };

        let outcome = fetcher.fetch_all(&endpoint.path).await;
        let fetch_error = outcome.error.as_ref().map(|err| {
            let mut message = err.to_string();
            if let Some(cause) = std::error::Error::source(err) {
                message.push_str(&format!(": {cause}"));
            }
            message
        });

        if outcome.records.is_empty() {
            return match fetch_error {
                Some(message) => EndpointStats::error(message),
                None => {
                    warn!(endpoint = %endpoint.name, "no records fetched");
                    EndpointStats::empty()
                }
            };
        }

        let mut mapped = Vec::with_capacity(outcome.records.len());
        let mut failed = 0_usize;
        for raw in &outcome.records {
            match mapper.map(raw) {
                Ok(record) => mapped.push(record),
                Err(err) => {
                    warn!(endpoint = %endpoint.name, error = %err, "dropping record");
                    failed += 1;
                }
            }
        }

        let batch = match store.upsert_batch(&endpoint.table, &mapped) {
            Ok(batch) => batch,
            Err(err) => {
                error!(endpoint = %endpoint.name, error = %format!("{err:#}"), "batch write failed");
                return EndpointStats::error(format!("{err:#}"));
            }
        };
        failed += batch.failed;

        info!(
            endpoint = %endpoint.name,
            table = %endpoint.table,
            pages = outcome.pages,
            complete = outcome.is_complete(),
            fetched = outcome.records.len(),
            inserted = batch.inserted,
            failed,
            "endpoint loaded"
        );

        match fetch_error {
            Some(message) => EndpointStats::partial(batch.inserted, failed, message),
            None => EndpointStats::success(batch.inserted, failed),
        }
    }

    fn counted_tables(&self) -> BTreeSet<String> {
        let config = &self.options.endpoints;
        config
            .endpoints
            .iter()
            .map(|endpoint| endpoint.table.clone())
            .chain(config.static_sources.values().map(|source| source.table.clone()))
            .chain(DERIVED_LOOKUPS.iter().map(|lookup| lookup.target_table.to_string()))
            .chain(std::iter::once("bvl_mittel_enrichments".to_string()))
            .collect()
    }

    fn record_sync_meta(&self, store: &Store) -> Result<BTreeMap<String, i64>> {
        let mut counts = BTreeMap::new();
        for table in self.counted_tables() {
            if store.table_exists(&table)? {
                let count = store.table_count(&table)?;
                counts.insert(table, count);
            }
        }

        store.set_meta("lastSyncIso", &now_utc_string())?;
        store.set_meta(
            "lastSyncCounts",
            &serde_json::to_string(&counts).context("failed to serialize table counts")?,
        )?;

        let stand = store.query_or_empty("SELECT stand FROM bvl_stand WHERE id = 1", []);
        if let Some(SqlValue::Text(stand)) = stand.first().and_then(|row| row.get("stand")) {
            store.set_meta("apiStand", stand)?;
            info!(api_stand = %stand, "recorded API data date");
        }

        Ok(counts)
    }

    fn validate(&self, store: &Store, stats: &mut BuildStats) -> ValidationReport {
        match validate_store(store, &self.options.endpoints.validation) {
            Ok(report) => {
                report.log();
                stats.extend_errors(report.errors.iter().map(|message| format!("validation: {message}")));
                report
            }
            Err(err) => {
                stats.record_error(format!("validation could not run: {err:#}"));
                ValidationReport::default()
            }
        }
    }

    fn package(
        &self,
        db_path: &Path,
        table_counts: BTreeMap<String, i64>,
        stats: &mut BuildStats,
    ) -> Option<PathBuf> {
        let packager = Packager::new(&self.options.output_dir, &self.options.endpoints.publish);
        match packager.package(db_path, table_counts, stats) {
            Ok(result) => {
                if result.manifest.files.is_empty() {
                    stats.extend_errors(result.failures);
                    stats.record_error("packaging produced no artifacts");
                }
                Some(result.manifest_path)
            }
            Err(err) => {
                stats.record_error(format!("packaging failed: {err:#}"));
                None
            }
        }
    }
}
