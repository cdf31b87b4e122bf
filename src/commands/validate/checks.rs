use super::*;

/// Structural and data-quality checks over a loaded export. Read-only.
pub fn validate_store(store: &Store, policy: &ValidationPolicy) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    check_required_objects(store, policy, &mut report)?;
    check_critical_tables(store, policy, &mut report)?;
    check_required_meta(store, policy, &mut report)?;
    check_enrichment_columns(store, policy, &mut report)?;
    check_bio_classification(store, policy, &mut report)?;

    Ok(report)
}

fn check_required_objects(
    store: &Store,
    policy: &ValidationPolicy,
    report: &mut ValidationReport,
) -> Result<()> {
    for table in &policy.required_tables {
        if !store.table_exists(table)? {
            report.error(format!("missing required table {table}"));
        }
    }
    for view in &policy.required_views {
        if !store.view_exists(view)? {
            report.error(format!("missing required view {view}"));
        }
    }
    Ok(())
}

fn check_critical_tables(
    store: &Store,
    policy: &ValidationPolicy,
    report: &mut ValidationReport,
) -> Result<()> {
    for (table, minimum) in &policy.critical_tables {
        if !store.table_exists(table)? {
            report.error(format!("critical table {table} is missing"));
            continue;
        }

        let count = store.table_count(table)?;
        report.table_counts.insert(table.clone(), count);
        if count == 0 {
            report.error(format!("critical table {table} is empty"));
        } else if count < *minimum {
            report.warning(format!(
                "critical table {table} has {count} rows, expected at least {minimum}"
            ));
        } else {
            report.note(format!("{table}: {count} rows"));
        }
    }
    Ok(())
}

fn check_required_meta(
    store: &Store,
    policy: &ValidationPolicy,
    report: &mut ValidationReport,
) -> Result<()> {
    if policy.required_meta.is_empty() {
        return Ok(());
    }
    if !store.table_exists("bvl_meta")? {
        report.error("cannot check metadata: bvl_meta is missing".to_string());
        return Ok(());
    }

    for key in &policy.required_meta {
        if store.get_meta(key)?.is_none() {
            report.error(format!("missing required metadata key {key}"));
        }
    }
    Ok(())
}

fn check_enrichment_columns(
    store: &Store,
    policy: &ValidationPolicy,
    report: &mut ValidationReport,
) -> Result<()> {
    let identifier = sql_identifier_regex()?;

    for check in &policy.enrichment_columns {
        let names = [&check.table, &check.key_column, &check.target_column];
        if let Some(bad) = names.iter().find(|name| !identifier.is_match(name)) {
            report.error(format!("enrichment check uses invalid identifier {bad}"));
            continue;
        }
        if !store.table_exists(&check.table)? {
            continue;
        }

        let sql = format!(
            "SELECT COUNT(*) AS missing FROM {} WHERE {} IS NOT NULL AND {} IS NULL",
            check.table, check.key_column, check.target_column
        );
        let missing = store
            .query(&sql, [])?
            .first()
            .and_then(|row| match row.get("missing") {
                Some(rusqlite::types::Value::Integer(count)) => Some(*count),
                _ => None,
            })
            .unwrap_or(0);
        if missing > 0 {
            report.warning(format!(
                "{missing} rows in {} still have NULL {} after enrichment",
                check.table, check.target_column
            ));
        }
    }
    Ok(())
}

fn check_bio_classification(
    store: &Store,
    policy: &ValidationPolicy,
    report: &mut ValidationReport,
) -> Result<()> {
    let view = &policy.bio_view;
    if view.is_empty() || !sql_identifier_regex()?.is_match(view) || !store.view_exists(view)? {
        return Ok(());
    }

    let rows = store.query(
        &format!(
            "SELECT
               COUNT(*) AS bio,
               COALESCE(SUM(CASE WHEN certification_body IS NOT NULL OR notes IS NOT NULL THEN 1 ELSE 0 END), 0) AS documented
             FROM {view} WHERE is_bio = 1"
        ),
        [],
    )?;
    let value = |column: &str| {
        rows.first()
            .and_then(|row| match row.get(column) {
                Some(rusqlite::types::Value::Integer(count)) => Some(*count),
                _ => None,
            })
            .unwrap_or(0)
    };

    let bio = value("bio");
    if bio == 0 {
        report.warning("no bio-classified products found".to_string());
    } else {
        report.note(format!(
            "{bio} bio products, {} with certification or notes",
            value("documented")
        ));
    }
    Ok(())
}
