use anyhow::Result;
use catalog_core::RecordSource;
use std::sync::Arc;

use crate::config::Config;
use crate::connector_articles::ArticleFileSource;
use crate::connector_studies::StudyDirectorySource;

/// Instantiate every configured source, studies first.
pub fn build_sources(config: &Config) -> Result<Vec<Arc<dyn RecordSource>>> {
    let mut sources: Vec<Arc<dyn RecordSource>> = Vec::new();
    if let Some(studies) = &config.sources.studies {
        sources.push(Arc::new(StudyDirectorySource::new(studies.clone())?));
    }
    if let Some(articles) = &config.sources.articles {
        sources.push(Arc::new(ArticleFileSource::new(articles.clone())));
    }
    Ok(sources)
}

pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<12} {:<40} HEALTHY", "SOURCE", "STATUS");

    let studies_status = match &config.sources.studies {
        Some(studies) => {
            if studies.root.is_dir() {
                (format!("OK ({})", studies.root.display()), true)
            } else {
                ("NOT FOUND (root does not exist)".to_string(), false)
            }
        }
        None => ("NOT CONFIGURED".to_string(), false),
    };
    println!("{:<12} {:<40} {}", "studies", studies_status.0, studies_status.1);

    let articles_status = match &config.sources.articles {
        Some(articles) => match ArticleFileSource::new(articles.clone()).resolved_path() {
            Some(path) if path == articles.path => (format!("OK ({})", path.display()), true),
            Some(path) => (format!("LEGACY ({})", path.display()), true),
            None => ("NOT FOUND (no article file)".to_string(), false),
        },
        None => ("NOT CONFIGURED".to_string(), false),
    };
    println!("{:<12} {:<40} {}", "articles", articles_status.0, articles_status.1);

    Ok(())
}
