//! Site list import and queue ordering

use crate::config::Config;
use crate::output::{OutputError, OutputResult};
use crate::state::SiteAssignment;
use crate::url::netloc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Deserialize)]
struct SiteRecord {
    organisation: String,
    url: String,
    #[serde(default)]
    sector: String,
}

#[derive(Debug, Deserialize)]
struct NoHeadRecord {
    url: String,
}

/// Reads every site list in `base-urls-visit-path`
///
/// Each CSV needs `organisation`, `url` and (optionally) `sector` columns.
/// Rows are filtered by the organisation/URL restrictions in the config, URLs
/// have their scheme and host lowercased, and sites listed under
/// `base-urls-nohead-path` (compared as whole normalized URLs) are marked as not supporting HEAD.
pub fn import_sites(config: &Config) -> OutputResult<Vec<SiteAssignment>> {
    let no_head = match &config.audit.base_urls_nohead_path {
        Some(dir) => import_no_head_urls(dir)?,
        None => HashSet::new(),
    };

    let filter_urls: HashSet<String> = config
        .audit
        .filter_to_urls
        .iter()
        .map(|u| lowercase_url(u.trim()))
        .collect();

    let mut sites = Vec::new();
    for path in csv_files(&config.audit.base_urls_visit_path)? {
        let mut reader = csv::Reader::from_path(&path)?;
        for record in reader.deserialize::<SiteRecord>() {
            let record = record.map_err(|e| site_list_error(&path, e))?;
            let url = lowercase_url(record.url.trim());

            if !config.audit.filter_to_organisations.is_empty()
                && !config
                    .audit
                    .filter_to_organisations
                    .contains(&record.organisation)
            {
                continue;
            }
            if !filter_urls.is_empty() && !filter_urls.contains(&url) {
                continue;
            }

            let mut site = SiteAssignment::new(record.organisation, url, record.sector);
            site.supports_head = !no_head.contains(&site.url);
            sites.push(site);
        }
    }

    tracing::info!(
        "Imported {} sites from {}",
        sites.len(),
        config.audit.base_urls_visit_path.display()
    );
    Ok(sites)
}

fn import_no_head_urls(dir: &Path) -> OutputResult<HashSet<String>> {
    let mut urls = HashSet::new();
    for path in csv_files(dir)? {
        let mut reader = csv::Reader::from_path(&path)?;
        for record in reader.deserialize::<NoHeadRecord>() {
            let record = record.map_err(|e| site_list_error(&path, e))?;
            urls.insert(lowercase_url(record.url.trim()));
        }
    }
    Ok(urls)
}

/// CSV files in a directory, sorted by name
fn csv_files(dir: &Path) -> OutputResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "csv"))
        .collect();
    files.sort();
    Ok(files)
}

fn site_list_error(path: &Path, e: csv::Error) -> OutputError {
    OutputError::SiteList {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Lowercases the scheme and host of a URL, leaving the path alone
///
/// Strings that do not parse are returned unchanged; they are rejected later
/// by the URL filters.
pub fn lowercase_url(raw: &str) -> String {
    let Some((scheme, rest)) = raw.split_once("://") else {
        return raw.to_string();
    };
    let split = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (host, tail) = rest.split_at(split);
    format!("{}://{}{}", scheme.to_lowercase(), host.to_lowercase(), tail)
}

/// Shuffles the site queue, trying not to put two sites on the same host
/// next to each other
pub fn shuffle_sites<R: Rng + ?Sized>(sites: &mut Vec<SiteAssignment>, rng: &mut R) {
    sites.shuffle(rng);
    spread_same_host(sites);
}

/// Moves a site back by one place when it shares its host with the site
/// placed before it
///
/// Only one site is held back at a time, so adjacent same-host sites remain
/// possible (for example when the last two sites share a host).
pub fn spread_same_host(sites: &mut Vec<SiteAssignment>) {
    let host = |site: &SiteAssignment| Url::parse(&site.url).ok().and_then(|u| netloc(&u));

    let mut ordered = Vec::with_capacity(sites.len());
    let mut last_host = None;
    let mut held: Option<SiteAssignment> = None;

    for site in sites.drain(..) {
        let current_host = host(&site);
        if held.is_none() && last_host.is_some() && last_host == current_host {
            held = Some(site);
            continue;
        }
        ordered.push(site);
        last_host = current_host;
        if let Some(site) = held.take() {
            last_host = host(&site);
            ordered.push(site);
        }
    }
    ordered.extend(held);

    *sites = ordered;
}
