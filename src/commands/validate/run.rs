use super::*;

pub fn run(args: ValidateArgs) -> Result<()> {
    let policy = match &args.config {
        Some(path) => EndpointsConfig::load(path)?.validation,
        None => ValidationPolicy::default(),
    };

    info!(db_path = %args.db_path.display(), "validating export");
    let store = Store::open_read_only(&args.db_path)?;
    let report = validate_store(&store, &policy)?;
    report.log();

    if let Some(report_path) = &args.report_path {
        write_report(report_path, &args.db_path, &report)?;
        info!(path = %report_path.display(), "wrote validation report");
    }

    if !report.passed() {
        anyhow::bail!(
            "validation failed with {} error(s): {}",
            report.errors.len(),
            report.errors.join("; ")
        );
    }

    Ok(())
}

fn write_report(path: &Path, db_path: &Path, report: &ValidationReport) -> Result<()> {
    let file = ValidationReportFile {
        generated_at: now_utc_string(),
        db_path: db_path.display().to_string(),
        passed: report.passed(),
        report,
    };
    write_json_pretty(path, &file)
        .with_context(|| format!("failed to write validation report {}", path.display()))
}
