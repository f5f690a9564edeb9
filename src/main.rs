use anyhow::Result;
use beneficiary_import::{
    config::{resolve_endpoint, EnvFileEndpoint, ImportConfig, PromptEndpoint, ResolveEndpoint},
    record::normalize_rows,
    report,
    source::{read_rows, SourceLocations},
    upload::{HttpTransport, Uploader},
};
use chrono::Local;
use std::{io, process::ExitCode};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// How a run that did not error ended.
enum Finish {
    Done,
    Aborted,
}

fn main() -> ExitCode {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    // ─── 2) run the import off-runtime, racing Ctrl-C ────────────────
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = rt.block_on(async {
        let import = tokio::task::spawn_blocking(run_import);
        tokio::select! {
            res = import => Some(res),
            Ok(()) = tokio::signal::ctrl_c() => None,
        }
    });
    // an abandoned in-flight batch is not waited for
    rt.shutdown_background();

    match outcome {
        None => {
            warn!("Import cancelled by user.");
            ExitCode::from(130)
        }
        Some(Ok(Ok(Finish::Done))) => ExitCode::SUCCESS,
        Some(Ok(Ok(Finish::Aborted))) => ExitCode::FAILURE,
        Some(Ok(Err(e))) => {
            error!("Unexpected error: {:?}", e);
            ExitCode::FAILURE
        }
        Some(Err(e)) => {
            error!("import thread failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_import() -> Result<Finish> {
    println!("{}", report::banner("📊 BENEFICIARY IMPORT"));
    let cfg = ImportConfig::from_env()?;

    // ─── locate + read the export ────────────────────────────────────
    info!("Looking for {}...", cfg.csv_file_name);
    let locations = SourceLocations::from_env(&cfg.project_root, &cfg.csv_file_name);
    let Some(csv_path) = locations.locate() else {
        error!("{} not found!", cfg.csv_file_name);
        println!("ℹ️  Put the file in one of these locations:");
        for (i, p) in locations.candidates().iter().enumerate() {
            println!("  {}. {}", i + 1, p.display());
        }
        return Ok(Finish::Aborted);
    };
    info!(path = %csv_path.display(), "CSV file found");

    let table = read_rows(&csv_path)?;
    info!("{} rows found", table.rows.len());

    // ─── resolve the backend ─────────────────────────────────────────
    let mut env_file = EnvFileEndpoint::from_config(&cfg);
    let mut prompt = PromptEndpoint::new(io::stdin().lock(), io::stdout(), cfg.endpoint_key.clone());
    let mut strategies: [&mut dyn ResolveEndpoint; 2] = [&mut env_file, &mut prompt];
    let Some(endpoint) = resolve_endpoint(&mut strategies)? else {
        warn!("No backend URL given; nothing uploaded.");
        return Ok(Finish::Aborted);
    };
    info!(url = %endpoint.base_url(), "Backend URL");

    // ─── normalize ───────────────────────────────────────────────────
    info!("Preparing records...");
    let records = normalize_rows(&table.headers, &table.rows)?;
    info!("{} records ready", records.len());

    // ─── upload ──────────────────────────────────────────────────────
    println!("{}", report::banner("📤 UPLOAD STARTING"));
    let transport = HttpTransport::new(&endpoint, cfg.timeout)?;
    info!(
        "{} records → {} ({} per batch)",
        records.len(),
        transport.url(),
        cfg.batch_size
    );
    let totals = Uploader::new(transport, cfg.mutation_path.clone(), cfg.batch_size, cfg.pause)
        .run(&records);

    // ─── report ──────────────────────────────────────────────────────
    print!("{}", report::summary(&totals, records.len()));
    if !totals.errors.is_empty() {
        let log_path = cfg.error_log_path();
        report::write_error_log(&log_path, &totals.errors, Local::now().naive_local())?;
        info!(path = %log_path.display(), "All errors saved");
    }

    Ok(Finish::Done)
}
