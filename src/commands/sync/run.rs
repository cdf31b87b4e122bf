use super::*;

pub fn run(args: SyncArgs) -> Result<()> {
    let options = SyncOptions::from_args(&args)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    let cancel = CancellationToken::new();

    let summary = runtime.block_on(async {
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling remaining fetches");
                interrupt.cancel();
            }
        });

        Pipeline::new(options, cancel.clone()).run().await
    })?;

    for (name, endpoint) in &summary.stats.endpoints {
        info!(
            endpoint = %name,
            status = endpoint.status.as_str(),
            count = endpoint.count,
            failed = endpoint.failed,
            "endpoint summary"
        );
    }

    if summary.stats.has_errors() {
        for message in &summary.stats.errors {
            error!(%message, "sync error");
        }
        bail!(
            "sync finished with {} error(s) after {:.1}s",
            summary.stats.errors.len(),
            summary.stats.duration_seconds()
        );
    }

    info!(
        duration_seconds = summary.stats.duration_seconds(),
        manifest = %summary
            .manifest_path
            .as_deref()
            .map(|path| path.display().to_string())
            .unwrap_or_default(),
        "sync complete"
    );
    Ok(())
}
