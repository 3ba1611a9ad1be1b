use anyhow::Context as _;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wearleak::analysis::Analyzer;
use wearleak::checks::{self, CHECKS};
use wearleak::cli::{AnalyzeArgs, Args, Command, OutputFormat, StgArgs, VfgArgs};
use wearleak::config::{self, WearleakConfig};
use wearleak::framework_catalog;
use wearleak::program::Program;
use wearleak::report::{self, Report};
use wearleak::stg::{self, Stg};

fn main() -> ExitCode {
    wearleak::telemetry::init_tracing();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    match args.command {
        Some(Command::ListChecks) => {
            list_checks();
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Explain { check }) => {
            explain_check(&check)?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Stg(stg)) => stg_command(stg),
        Some(Command::Vfg(vfg)) => vfg_command(vfg),
        Some(Command::Analyze(analyze)) => analyze_command(analyze),
        None => analyze_command(args.analyze),
    }
}

fn list_checks() {
    for d in CHECKS {
        println!(
            "{}\t{}\t{}\t{}",
            d.name,
            d.category.as_str(),
            d.default_level.as_str(),
            d.description
        );
    }
}

fn explain_check(check: &str) -> anyhow::Result<()> {
    let Some(d) = checks::find_check(check) else {
        anyhow::bail!("unknown check: {check}");
    };

    println!("name: {}", d.name);
    println!("category: {}", d.category.as_str());
    println!("default level: {}", d.default_level.as_str());
    println!("description: {}", d.description);
    println!();
    println!("{}", d.explanation);
    Ok(())
}

fn analyze_command(args: AnalyzeArgs) -> anyhow::Result<ExitCode> {
    if args.paths.is_empty() {
        anyhow::bail!("no program model given");
    }
    let mut cfg = resolve_config(args.config.as_deref(), &args.paths)?;

    // CLI flags take precedence over config
    if let Some(k) = args.path_length {
        cfg.analysis.path_length = k;
    }
    if let Some(cap) = args.recursion_cap {
        cfg.analysis.recursion_cap = cap;
    }
    if let Some(mode) = args.branch_resolution {
        cfg.analysis.branch_resolution = mode;
    }
    cfg.validate().map_err(|e| e.into_anyhow())?;
    let check_settings = cfg.check_settings();

    let models = wearleak::collect_model_files(&args.paths)?;
    let mut reports = Vec::with_capacity(models.len());
    for model in &models {
        let detected = wearleak::analyze_model(model, &cfg)
            .map_err(|e| e.into_anyhow())
            .with_context(|| format!("failed to analyze {}", model.display()))?;
        reports.push(Report::from_detector(
            model.display().to_string(),
            &detected,
            &check_settings,
        ));
    }

    match args.format {
        OutputFormat::Pretty => {
            for r in &reports {
                print!("{}", report::render_pretty(r));
            }
        }
        OutputFormat::Json => println!("{}", report::render_json(&reports)?),
        OutputFormat::Markdown => print!("{}", report::render_markdown(&reports)),
    }

    if let Some(dir) = &args.emit_tests {
        emit_test_cases(dir, &reports)?;
    }

    if reports.iter().any(|r| r.is_failure(args.deny_warnings)) {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn emit_test_cases(dir: &Path, reports: &[Report]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    for r in reports {
        let script = report::leak_test_cases(r.leaks());
        if script.is_empty() {
            continue;
        }
        let stem = Path::new(&r.source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        let path = dir.join(format!("{stem}.leaks.txt"));
        std::fs::write(&path, script).with_context(|| format!("cannot write {}", path.display()))?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}

fn stg_command(args: StgArgs) -> anyhow::Result<ExitCode> {
    if args.dot {
        print!("{}", stg::to_dot());
    } else if let Some(k) = args.path_length {
        if k == 0 {
            anyhow::bail!("--path-length must be at least 1");
        }
        for path in stg::paths_from(args.from, k) {
            let events: Vec<_> = path.iter().map(|t| t.event.as_str()).collect();
            let end = path.last().map(|t| t.target).unwrap_or(args.from);
            println!("[{}] -> {end}", events.join(", "));
        }
    } else {
        for t in &stg::TRANSITIONS {
            let callbacks: Vec<_> = t.callbacks.iter().map(ToString::to_string).collect();
            println!("{}\t{}\t{}\t{}", t.source, t.event, t.target, callbacks.join(", "));
        }
    }

    if let Some(model) = &args.model {
        let cfg = resolve_config(args.config.as_deref(), std::slice::from_ref(model))?;
        describe_engines(model, &cfg)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Load `model` with `cfg`'s library prefixes applied, as `analyze` sees it.
fn load_prepared(model: &Path, cfg: &WearleakConfig) -> anyhow::Result<Program> {
    let mut program = Program::load(model).map_err(|e| e.into_anyhow())?;
    wearleak::prepare_program(&mut program, cfg).map_err(|e| e.into_anyhow())?;
    Ok(program)
}

/// Print each engine's callbacks and the labels found in them.
fn describe_engines(model: &Path, cfg: &WearleakConfig) -> anyhow::Result<()> {
    let program = load_prepared(model, cfg)?;
    let mut analyzer = Analyzer::new(&program, cfg.analysis_settings());
    let engines: Vec<_> = program
        .application_classes()
        .filter(|c| framework_catalog::is_watch_face_engine(analyzer.hierarchy(), *c))
        .collect();
    for engine in engines {
        println!("\n{}", program.class(engine).name);
        let stg = Stg::construct(&mut analyzer, engine, true).map_err(|e| e.into_anyhow())?;
        for (callback, method) in stg.callbacks() {
            let (acquires, releases) = stg
                .summary(callback)
                .map_or((0, 0), |s| (s.acquires.len(), s.releases.len()));
            let name = callback.to_string();
            println!(
                "  {name:<28} {}  acquires={acquires} releases={releases}",
                program.signature(method)
            );
        }
    }
    Ok(())
}

fn vfg_command(args: VfgArgs) -> anyhow::Result<ExitCode> {
    let cfg = resolve_config(args.config.as_deref(), std::slice::from_ref(&args.model))?;
    let program = load_prepared(&args.model, &cfg)?;
    let analyzer = Analyzer::new(&program, cfg.analysis_settings());
    let graph = analyzer.flow_graph();
    tracing::info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "value-flow graph"
    );
    print!("{}", graph.to_dot(&program));
    Ok(ExitCode::SUCCESS)
}

/// Explicit `--config`, else the nearest wearleak.toml above the first path.
fn resolve_config(explicit: Option<&Path>, paths: &[PathBuf]) -> anyhow::Result<WearleakConfig> {
    let start_dir = infer_start_dir(paths)?;
    match config::load_config(explicit, &start_dir)? {
        Some((path, cfg)) => {
            tracing::debug!(config = %path.display(), "configuration loaded");
            Ok(cfg)
        }
        None => Ok(WearleakConfig::default()),
    }
}

fn infer_start_dir(paths: &[PathBuf]) -> anyhow::Result<PathBuf> {
    let base = match paths.first() {
        Some(p) => p.clone(),
        None => std::env::current_dir()?,
    };

    let base = if base.is_file() {
        base.parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        base
    };

    Ok(base)
}
