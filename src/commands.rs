use crate::cli::{Cli, Commands, ExportArgs, ListArgs, SearchArgs, UseArgs, ViewArgs};
use crate::registry::{self, Registry};
use crate::requirement::Requirement;
use crate::resolver::Resolver;
use color_eyre::eyre::{Result, eyre};
use console::Style;
use std::path::PathBuf;

pub fn execute(cli: Cli) -> Result<()> {
    let paths = if cli.paths.is_empty() {
        registry::default_paths()
    } else {
        cli.paths.clone()
    };
    if paths.is_empty() {
        return Err(eyre!(
            "no registry path given; use --path or set WIZ_REGISTRY_PATHS"
        ));
    }

    match &cli.command {
        Commands::List(args) => list(&paths, cli.max_depth, args),
        Commands::Search(args) => search(&paths, cli.max_depth, args),
        Commands::View(args) => view(&paths, cli.max_depth, args),
        Commands::Use(args) => use_packages(&paths, cli.max_depth, args),
        Commands::Export(args) => export(&paths, cli.max_depth, args),
    }
}

fn list(paths: &[PathBuf], max_depth: Option<usize>, args: &ListArgs) -> Result<()> {
    let registry = Registry::fetch(paths, &[], max_depth);
    let bold = Style::new().bold();

    if args.commands {
        if registry.commands().is_empty() {
            println!("No command found.");
            return Ok(());
        }
        for (alias, identifier) in registry.commands() {
            println!("{} -> {}", bold.apply_to(alias), identifier);
        }
        return Ok(());
    }

    if registry.is_empty() {
        println!("No definition found.");
        return Ok(());
    }
    for (identifier, versions) in registry.iter() {
        let listed: Vec<&str> = versions.keys().map(String::as_str).collect();
        println!("{} [{}]", bold.apply_to(identifier), listed.join(", "));
    }
    Ok(())
}

fn search(paths: &[PathBuf], max_depth: Option<usize>, args: &SearchArgs) -> Result<()> {
    let requests = parse_requests(&args.requests)?;
    let registry = Registry::fetch(paths, &requests, max_depth);

    if registry.is_empty() {
        println!("No matching definition found.");
        return Ok(());
    }
    let bold = Style::new().bold();
    for (identifier, versions) in registry.iter() {
        for (version, definition) in versions {
            println!(
                "{} [{}] {}",
                bold.apply_to(identifier),
                version,
                definition.description()
            );
        }
    }
    Ok(())
}

fn view(paths: &[PathBuf], max_depth: Option<usize>, args: &ViewArgs) -> Result<()> {
    let request: Requirement = args.request.parse()?;
    let registry = Registry::fetch(paths, &[], max_depth);
    let candidates = registry.query(&request)?;
    let candidate = candidates
        .first()
        .ok_or_else(|| eyre!("request '{}' matched nothing", args.request))?;
    println!("{}", candidate.definition.encode()?);
    Ok(())
}

fn use_packages(paths: &[PathBuf], max_depth: Option<usize>, args: &UseArgs) -> Result<()> {
    let registry = Registry::fetch(paths, &[], max_depth);
    let packages = Resolver::new(&registry).resolve(&args.requests)?;

    let bold = Style::new().bold();
    let dim = Style::new().dim();
    println!("{}", bold.apply_to("Resolved environment:"));
    for package in &packages {
        match &package.definition().description {
            Some(description) => {
                println!("  {}  {}", package.identifier(), dim.apply_to(description))
            }
            None => println!("  {}", package.identifier()),
        }
    }

    let commands = packages
        .iter()
        .flat_map(|package| package.command().into_keys())
        .collect::<Vec<_>>();
    if !commands.is_empty() {
        println!("{}", bold.apply_to("Available commands:"));
        for alias in commands {
            println!("  {alias}");
        }
    }
    Ok(())
}

fn export(paths: &[PathBuf], max_depth: Option<usize>, args: &ExportArgs) -> Result<()> {
    let request: Requirement = args.request.parse()?;
    let registry = Registry::fetch(paths, &[], max_depth);
    let candidates = registry.query(&request)?;
    let candidate = candidates
        .first()
        .ok_or_else(|| eyre!("request '{}' matched nothing", args.request))?;

    let target = registry::export(&args.directory, &candidate.definition, args.overwrite)?;
    println!("Exported {}", target.display());
    Ok(())
}

fn parse_requests(requests: &[String]) -> Result<Vec<Requirement>> {
    requests
        .iter()
        .map(|request| request.parse::<Requirement>().map_err(Into::into))
        .collect()
}
