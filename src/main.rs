mod detect;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use profile::{Domain, HiddenReason, Package, ResolverConfig, UseState, Visibility};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Buckos profile inspector - resolve profiles and per-package configuration
#[derive(Parser, Debug)]
#[clap(name = "buckos-profile", author, version, about, long_about = None)]
struct Args {
    /// Resolver configuration file (TOML)
    #[clap(short, long, env = "BUCKOS_PROFILE_CONFIG")]
    config: Option<PathBuf>,

    /// Profile directory (auto-detected if not specified)
    #[clap(long)]
    profile: Option<PathBuf>,

    /// User configuration directory
    #[clap(long = "user-config")]
    user_config: Option<PathBuf>,

    /// License groups file
    #[clap(long = "license-groups")]
    license_groups: Option<PathBuf>,

    /// Override the profile's ARCH
    #[clap(long)]
    arch: Option<String>,

    /// Print JSON instead of text
    #[clap(long)]
    json: bool,

    /// Increase log verbosity (-v, -vv)
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Subcommand to execute
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the profile inheritance order
    Stack,
    /// Show the environment folded from every make.defaults
    Env,
    /// Resolve USE flags for a package
    Use {
        /// Package as category/name-version
        cpv: String,
        /// IUSE, with +/- default markers
        #[clap(long, default_value = "")]
        iuse: String,
        /// KEYWORDS of the package
        #[clap(long, default_value = "")]
        keywords: String,
    },
    /// Check whether a package may be installed
    Visible {
        /// Package as category/name-version
        cpv: String,
        /// KEYWORDS of the package
        #[clap(long, default_value = "")]
        keywords: String,
        /// Licenses the package requires
        #[clap(long, default_value = "")]
        licenses: String,
        /// Package slot
        #[clap(long)]
        slot: Option<String>,
        /// Repository the package comes from
        #[clap(long)]
        repo: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = resolver_config(&args)?;
    let domain = config
        .build_domain()
        .with_context(|| format!("Failed to load profile {}", config.profile.display()))?;

    match &args.command {
        Commands::Stack => show_stack(&domain, args.json)?,
        Commands::Env => show_env(&domain, args.json)?,
        Commands::Use { cpv, iuse, keywords } => {
            let pkg = parse_package(cpv)?.with_iuse(iuse).with_keywords(keywords);
            show_use(&pkg, &domain.use_state(&pkg), args.json)?;
        }
        Commands::Visible {
            cpv,
            keywords,
            licenses,
            slot,
            repo,
        } => {
            let mut pkg = parse_package(cpv)?
                .with_keywords(keywords)
                .with_licenses(licenses);
            if let Some(slot) = slot {
                pkg = pkg.with_slot(slot);
            }
            if let Some(repo) = repo {
                pkg = pkg.with_repository(repo);
            }
            show_visibility(&pkg, &domain.visibility(&pkg), args.json)?;
        }
    }

    Ok(())
}

fn resolver_config(args: &Args) -> Result<ResolverConfig> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::load(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => ResolverConfig::default(),
    };

    // without a config file the profile comes from detection
    if args.profile.is_some() || args.config.is_none() {
        config.profile = detect::detect_profile_path(args.profile.as_deref())?;
    }
    if let Some(user_config) = &args.user_config {
        config.user_config = user_config.clone();
    }
    if let Some(license_groups) = &args.license_groups {
        config.license_groups = Some(license_groups.clone());
    }
    if let Some(arch) = &args.arch {
        config.arch = Some(arch.clone());
    }
    Ok(config)
}

fn parse_package(cpv: &str) -> Result<Package> {
    Package::parse_cpv(cpv).with_context(|| format!("Invalid package: {}", cpv))
}

fn show_stack(domain: &Domain, as_json: bool) -> Result<()> {
    let stack = domain.profile();
    let nodes: Vec<_> = stack.nodes().map(|n| n.path().display().to_string()).collect();
    let deprecated = stack.deprecated()?;

    if as_json {
        let out = json!({
            "profile": stack.root().path(),
            "eapi": stack.eapi()?.number(),
            "arch": domain.arch(),
            "nodes": nodes,
            "bashrc": stack.bashrc(),
            "deprecated": deprecated,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Profile: {}", stack.root().path().display());
    println!("EAPI: {}", stack.eapi()?);
    println!("ARCH: {}", domain.arch().unwrap_or("(unset)"));
    if let Some(deprecated) = deprecated {
        println!("Deprecated, replaced by: {}", deprecated.replacement);
    }
    println!();
    println!("Inheritance order:");
    for (i, node) in nodes.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, node);
    }
    Ok(())
}

fn show_env(domain: &Domain, as_json: bool) -> Result<()> {
    let env = domain.profile().default_env()?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(env)?);
        return Ok(());
    }
    for (name, value) in env.iter() {
        println!("{}=\"{}\"", name, value.as_string());
    }
    Ok(())
}

fn show_use(pkg: &Package, state: &UseState, as_json: bool) -> Result<()> {
    if as_json {
        let out = json!({ "package": pkg.to_string(), "use": state });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let join = |flags: &std::collections::BTreeSet<String>| {
        flags.iter().cloned().collect::<Vec<_>>().join(" ")
    };
    println!("{}", pkg);
    println!("  USE:    {}", join(&state.enabled));
    println!("  forced: {}", join(&state.forced));
    println!("  masked: {}", join(&state.masked));
    Ok(())
}

fn show_visibility(pkg: &Package, visibility: &Visibility, as_json: bool) -> Result<()> {
    if as_json {
        let out = json!({ "package": pkg.to_string(), "visibility": visibility });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match visibility {
        Visibility::Visible => println!("{}: visible", pkg),
        Visibility::Hidden(reasons) => {
            println!("{}: hidden", pkg);
            for reason in reasons {
                match reason {
                    HiddenReason::Masked => println!("  - masked by package.mask"),
                    HiddenReason::NotInProfile(atom) => {
                        println!("  - excluded by profile packages entry {}", atom)
                    }
                    HiddenReason::MissingKeyword(keywords) => {
                        println!("  - no accepted keyword in: {}", keywords.join(" "))
                    }
                    HiddenReason::License(licenses) => {
                        println!("  - license not accepted: {}", licenses.join(" "))
                    }
                }
            }
        }
    }
    Ok(())
}
