//! Free functions shared by every merger: name normalisation, de-duplication and the
//! carry-over of files, volumes and notes from source resources into a stack.

use crate::model::{MappingResult, Network, Stack, StackType};
use crate::taxonomy::ResourceType;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use super::MergeOptions;

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"))
}

fn non_identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]+").expect("valid regex"))
}

/// Lowercase, hyphen separated, safe for service, queue and bucket names.
///
/// Returns `"resource"` when nothing usable is left.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let replaced = non_alnum().replace_all(&lowered, "-");
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        "resource".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalises to an SQL identifier: `[a-z_][a-z0-9_]*`, clamped to `max_len`.
pub fn normalize_identifier(raw: &str, max_len: usize) -> String {
    let lowered = raw.trim().to_lowercase();
    let replaced = non_identifier().replace_all(&lowered, "_");
    let mut ident: String = replaced
        .split('_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_");

    if ident.is_empty() {
        ident = "db".to_string();
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident = format!("db_{}", ident);
    }
    ident.truncate(max_len);
    ident.trim_end_matches('_').to_string()
}

/// Hands out unique names in call order, suffixing repeats with `<sep>2`, `<sep>3`, ...
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
    separator: &'static str,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::with_separator("-")
    }

    pub fn with_separator(separator: &'static str) -> Self {
        Self {
            used: HashSet::new(),
            separator,
        }
    }

    pub fn reserve(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    pub fn allocate(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}{}{}", base, self.separator, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Like [`allocate`](Self::allocate) but keeps the result within `max_len`.
    pub fn allocate_clamped(&mut self, base: &str, max_len: usize) -> String {
        if base.len() <= max_len && self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let suffix = if n == 1 {
                String::new()
            } else {
                format!("{}{}", self.separator, n)
            };
            let keep = max_len.saturating_sub(suffix.len());
            let head: String = base.chars().take(keep).collect();
            let candidate = format!("{}{}", head.trim_end_matches(['-', '_']), suffix);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Applicability check shared by mergers.
///
/// Catalogued types answer through `known`. For type identifiers missing from the catalog the
/// category hint decides, and only when that is absent too do the underscore separated tokens of
/// the identifier get compared against `fallback_tokens`.
pub fn any_applicable<F>(results: &[MappingResult], known: F, fallback_tokens: &[&str]) -> bool
where
    F: Fn(ResourceType) -> bool,
{
    results.iter().any(|result| match result.resource_type() {
        Some(resource_type) => known(resource_type),
        None => match result.source_category {
            Some(category) => crate::taxonomy::types_in_category(category)
                .into_iter()
                .any(&known),
            None => type_has_token(&result.source_type, fallback_tokens),
        },
    })
}

/// Token match on an identifier such as `aws_future_queue`.
pub fn type_has_token(type_id: &str, tokens: &[&str]) -> bool {
    type_id
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| tokens.contains(&part))
}

/// Per-stack bridge network name.
pub fn stack_network(opts: &MergeOptions, stack_type: StackType) -> String {
    opts.prefixed(&format!("{}-net", stack_type.as_str()))
}

/// Starts a stack with the prefixed name, its own network and every source attached.
pub fn new_stack(stack_type: StackType, results: &[MappingResult], opts: &MergeOptions) -> Stack {
    let mut stack = Stack::new(stack_type, opts.prefixed(stack_type.as_str()));
    stack.add_network(Network::bridge(stack_network(opts, stack_type)));
    for result in results {
        stack.add_source(result);
    }
    stack
}

/// Copies configs and scripts verbatim. On a path clash with different content the incoming
/// file is placed under a directory named after its source resource.
pub fn merge_files(stack: &mut Stack, results: &[MappingResult]) {
    for result in results {
        let owner = normalize_name(&result.source_name);
        merge_file_map(&mut stack.configs, &result.configs, &owner);
        merge_file_map(&mut stack.scripts, &result.scripts, &owner);
    }
}

fn merge_file_map(
    target: &mut BTreeMap<String, String>,
    incoming: &BTreeMap<String, String>,
    owner: &str,
) {
    for (path, body) in incoming {
        match target.get(path) {
            None => {
                target.insert(path.clone(), body.clone());
            }
            Some(existing) if existing == body => {}
            Some(_) => {
                target.insert(format!("{}/{}", owner, path), body.clone());
            }
        }
    }
}

/// Volumes and networks declared by the source results.
pub fn merge_volumes_and_networks(stack: &mut Stack, results: &[MappingResult]) {
    for result in results {
        for volume in &result.volumes {
            stack.add_volume(volume.clone());
        }
        for network in &result.networks {
            stack.add_network(network.clone());
        }
    }
}

/// Carries forward warnings and manual steps already known for the sources.
pub fn carry_notes(stack: &mut Stack, results: &[MappingResult]) {
    for result in results {
        for warning in &result.warnings {
            stack.add_warning(format!("{}: {}", result.source_name, warning));
        }
        for step in &result.manual_steps {
            stack.add_manual_step(step.clone());
        }
    }
}

/// Everything a merger copies from its sources regardless of domain.
pub fn absorb_sources(stack: &mut Stack, results: &[MappingResult]) {
    merge_files(stack, results);
    merge_volumes_and_networks(stack, results);
    carry_notes(stack, results);
}

/// Opening lines of every generated bash script.
pub fn script_header(title: &str) -> String {
    format!("#!/usr/bin/env bash\n# {}\nset -euo pipefail\n\n", title)
}

/// Header for scripts run by `/bin/sh` inside minimal images.
pub fn posix_script_header(title: &str) -> String {
    format!("#!/bin/sh\n# {}\nset -eu\n\n", title)
}

/// Single-quotes a value for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// First non-empty environment hint among `keys`.
pub fn env_hint<'a>(result: &'a MappingResult, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| result.env(key))
        .map(str::trim)
        .find(|value| !value.is_empty())
}
