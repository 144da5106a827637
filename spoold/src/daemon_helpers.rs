async fn scan_once(
    scanner: &DirectoryScanner,
    dispatcher: &Dispatcher,
) -> Result<ReconcileReport, ScanError> {
    let ticket = dispatcher.scan_ticket().await;
    let scanned = scanner.scan().await?;
    Ok(dispatcher.reconcile_scan(&scanned, ticket).await)
}

async fn scan_lane(scanner: DirectoryScanner, dispatcher: Arc<Dispatcher>, interval: Duration) {
    loop {
        match scan_once(&scanner, &dispatcher).await {
            Ok(report) if !report.is_empty() => {
                tracing::info!(
                    added = report.added,
                    removed = report.removed,
                    "scan reconciled"
                );
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "scan failed, skipping cycle"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Resolves as soon as either lane ends. Both are expected to run for the
/// life of the process, so any exit is an error.
async fn watch_lanes(
    scan: &mut JoinHandle<()>,
    dispatch: &mut JoinHandle<Result<(), DispatchError>>,
) -> anyhow::Result<()> {
    tokio::select! {
        res = scan => match res {
            Ok(()) => anyhow::bail!("scan lane stopped"),
            Err(err) => Err(anyhow::Error::new(err).context("scan lane aborted")),
        },
        res = dispatch => match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::Error::new(err).context("dispatcher stopped")),
            Err(err) => Err(anyhow::Error::new(err).context("dispatch lane aborted")),
        },
    }
}

fn lock_backoff() -> Backoff {
    Backoff::new(Duration::from_millis(250), Duration::from_secs(5), true)
}

fn log_lock_event(event: LockEvent) {
    match event {
        LockEvent::Granted { port } => tracing::info!(port, "instance lock granted"),
        LockEvent::Retrying { attempt, delay } => tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "instance lock busy, retrying"
        ),
        LockEvent::Exhausted { attempts } => {
            tracing::error!(attempts, "instance lock still held by another instance, giving up")
        }
    }
}

/// Patterns are `;`-separated regular expressions matched against file names.
fn parse_patterns(raw: Option<&str>) -> anyhow::Result<Vec<Regex>> {
    let raw = raw.unwrap_or_default();
    let mut patterns = Vec::new();
    for part in raw.split(';').map(str::trim).filter(|part| !part.is_empty()) {
        let re = Regex::new(part).with_context(|| format!("invalid file pattern {part:?}"))?;
        patterns.push(re);
    }
    if patterns.is_empty() {
        patterns.push(Regex::new(DEFAULT_PATTERN)?);
    }
    Ok(patterns)
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
