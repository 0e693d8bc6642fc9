//! Logging setup.
//!
//! Verbosity is a single tier chosen from the CLI flags, refined per target
//! with `--log` overrides; a set `RUST_LOG` replaces both. Lines go to stderr
//! as text or JSON.

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}', expected 'text' or 'json'")),
        }
    }
}

/// How chatty the server is, from `--quiet` up to `--trace`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    #[default]
    Standard,
    Verbose,
    Debug,
    Trace,
}

impl Verbosity {
    /// `--quiet` wins outright; otherwise the deepest requested tier does.
    pub fn from_flags(verbose: bool, debug: bool, trace: bool, quiet: bool) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        [
            (trace, Verbosity::Trace),
            (debug, Verbosity::Debug),
            (verbose, Verbosity::Verbose),
        ]
        .into_iter()
        .filter_map(|(set, tier)| set.then_some(tier))
        .max()
        .unwrap_or(Verbosity::Standard)
    }

    /// Level applied to the whole `sectorflux` tree at this tier.
    fn base_level(self) -> Level {
        match self {
            Verbosity::Quiet => Level::WARN,
            Verbosity::Standard | Verbosity::Verbose => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }

    /// Targets held below the base at this tier. Standard keeps the
    /// steady-state background loops quiet; Verbose and up let them through.
    fn muted_targets(self) -> &'static [&'static str] {
        match self {
            Verbosity::Standard => &["sectorflux::store", "sectorflux::broadcast"],
            _ => &[],
        }
    }

    fn tower_http_level(self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Standard | Verbosity::Verbose => Level::WARN,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }
}

/// One `--log target=level` refinement.
#[derive(Debug, Clone)]
pub struct TargetOverride {
    target: String,
    level: Level,
}

/// Parse the `--log` values. Each one is a single `target=level` pair; bare
/// targets are rooted under `sectorflux::`, while qualified targets and
/// `tower_http` pass through untouched. Malformed values are rejected so a
/// typo does not silently log nothing.
pub fn parse_overrides(raw: &[String]) -> Result<Vec<TargetOverride>, String> {
    raw.iter().map(|entry| parse_override(entry)).collect()
}

fn parse_override(entry: &str) -> Result<TargetOverride, String> {
    let (target, level) = entry
        .split_once('=')
        .ok_or_else(|| format!("--log '{entry}' is not of the form target=level"))?;
    let target = target.trim();
    if target.is_empty() {
        return Err(format!("--log '{entry}' names no target"));
    }
    let level: Level = level
        .trim()
        .parse()
        .map_err(|_| format!("--log '{entry}' has an unknown level"))?;

    let target = if target.contains("::") || target == "tower_http" {
        target.to_string()
    } else {
        format!("sectorflux::{target}")
    };
    Ok(TargetOverride { target, level })
}

/// Fully resolved logging options.
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub verbosity: Verbosity,
    pub overrides: Vec<TargetOverride>,
    pub format: LogFormat,
}

impl LogOptions {
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        raw_overrides: &[String],
        format: LogFormat,
    ) -> Result<Self, String> {
        Ok(Self {
            verbosity: Verbosity::from_flags(verbose, debug, trace, quiet),
            overrides: parse_overrides(raw_overrides)?,
            format,
        })
    }

    /// Assemble the filter: tier base, then tier muting, then overrides, each
    /// layer refining the previous one. A set `RUST_LOG` replaces the lot.
    fn filter(&self) -> EnvFilter {
        if let Ok(from_env) = EnvFilter::try_from_default_env() {
            return from_env;
        }

        let mut directives: Vec<String> = Vec::new();
        for target in self.verbosity.muted_targets() {
            directives.push(format!("{target}=warn"));
        }
        directives.push(format!("tower_http={}", self.verbosity.tower_http_level()));
        for o in &self.overrides {
            directives.push(format!("{}={}", o.target, o.level));
        }

        let mut filter = EnvFilter::new(format!("sectorflux={}", self.verbosity.base_level()));
        for directive in directives {
            match directive.parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("skipping log directive '{directive}': {e}"),
            }
        }
        filter
    }
}

/// Install the global subscriber; lines go to stderr in the selected format.
pub fn init(options: &LogOptions) {
    let filter = options.filter();
    let layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    match options.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_prefers_the_deepest_flag() {
        assert_eq!(
            Verbosity::from_flags(false, false, false, false),
            Verbosity::Standard
        );
        assert_eq!(
            Verbosity::from_flags(true, false, false, false),
            Verbosity::Verbose
        );
        assert_eq!(
            Verbosity::from_flags(true, true, false, false),
            Verbosity::Debug
        );
        assert_eq!(
            Verbosity::from_flags(false, true, true, false),
            Verbosity::Trace
        );
    }

    #[test]
    fn quiet_flag_wins_over_everything() {
        assert_eq!(
            Verbosity::from_flags(true, true, true, true),
            Verbosity::Quiet
        );
    }

    #[test]
    fn bare_override_targets_are_rooted() {
        let parsed = parse_overrides(&["proxy=debug".to_string()]).unwrap();
        assert_eq!(parsed[0].target, "sectorflux::proxy");
        assert_eq!(parsed[0].level, Level::DEBUG);
    }

    #[test]
    fn qualified_override_targets_pass_through() {
        let parsed = parse_overrides(&[
            "sectorflux::store=trace".to_string(),
            "tower_http=error".to_string(),
        ])
        .unwrap();
        assert_eq!(parsed[0].target, "sectorflux::store");
        assert_eq!(parsed[0].level, Level::TRACE);
        assert_eq!(parsed[1].target, "tower_http");
        assert_eq!(parsed[1].level, Level::ERROR);
    }

    #[test]
    fn malformed_overrides_are_rejected() {
        assert!(parse_overrides(&["proxy".to_string()]).is_err());
        assert!(parse_overrides(&["=debug".to_string()]).is_err());
        assert!(parse_overrides(&["proxy=loud".to_string()]).is_err());
        // One bad entry poisons the whole set.
        assert!(parse_overrides(&["proxy=debug".to_string(), "oops".to_string()]).is_err());
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("Json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
