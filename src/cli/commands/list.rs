//! `list` command
//!
//! Prints every registered domain with its phases in run order.

use serde::Serialize;

use crate::cli::args::{ListArgs, OutputFormat};
use crate::error::TbPhaseError;
use crate::phase::{TraversalPolicy, get_domains};

#[derive(Debug, Serialize)]
struct DomainListing {
    domain: String,
    phases: Vec<PhaseListing>,
}

#[derive(Debug, Serialize)]
struct PhaseListing {
    name: String,
    policy: TraversalPolicy,
    run_count: u64,
}

/// List every registered domain and its phases.
///
/// # Errors
///
/// Returns a JSON error if the listing cannot be serialized.
pub fn run(args: &ListArgs) -> Result<(), TbPhaseError> {
    let listings = collect();
    match args.format {
        OutputFormat::Human => print!("{}", render_human(&listings)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&listings)?),
    }
    Ok(())
}

fn collect() -> Vec<DomainListing> {
    get_domains()
        .into_iter()
        .map(|(domain, graph)| DomainListing {
            domain,
            phases: graph
                .phases()
                .iter()
                .map(|p| PhaseListing {
                    name: p.name().to_owned(),
                    policy: p.policy(),
                    run_count: p.run_count(),
                })
                .collect(),
        })
        .collect()
}

fn render_human(listings: &[DomainListing]) -> String {
    let mut out = String::new();
    for listing in listings {
        out.push_str(&format!("{} ({} phases)\n", listing.domain, listing.phases.len()));
        for phase in &listing.phases {
            out.push_str(&format!("  {:<28} {}\n", phase.name, phase.policy));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::COMMON_DOMAIN;

    #[test]
    fn common_domain_is_listed_in_order() {
        let listings = collect();
        let common = listings
            .iter()
            .find(|l| l.domain == COMMON_DOMAIN)
            .unwrap();
        assert_eq!(common.phases.len(), 9);
        assert_eq!(common.phases[0].name, "build_phase");
        assert_eq!(common.phases[4].policy, TraversalPolicy::Task);
    }

    #[test]
    fn human_rendering() {
        let listings = vec![DomainListing {
            domain: "uvm".into(),
            phases: vec![PhaseListing {
                name: "reset_phase".into(),
                policy: TraversalPolicy::Task,
                run_count: 0,
            }],
        }];
        let text = render_human(&listings);
        assert!(text.starts_with("uvm (1 phases)\n"));
        assert!(text.contains("reset_phase"));
        assert!(text.trim_end().ends_with("TASK"));
    }
}
