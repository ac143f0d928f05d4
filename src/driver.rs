//! Validate, search, then either list the matches or fetch each one.
use crate::auth::{BearerToken, Credentials, TokenProvider};
use crate::catalog::{CatalogClient, CatalogItem};
use crate::error::{Error, ErrorKind, Result};
use crate::fetcher::{AssetFetcher, FetchOutcome};
use crate::filter::{build_filter, SearchParams};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const ARCHIVE_SUFFIX: &str = ".zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Validating,
    Searching,
    ListOnly,
    Authenticating,
    Fetching,
    Done,
    Failed(ErrorKind),
}

pub enum Mode {
    List,
    Fetch {
        credentials: Credentials,
        dest_dir: PathBuf,
    },
}

pub struct RetrievalRequest {
    pub params: SearchParams,
    /// Passed through as `$top`
    pub top: Option<u32>,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Listed,
    Downloaded { bytes: u64 },
    AlreadyPresent,
    Failed { reason: String },
}

impl From<FetchOutcome> for ItemStatus {
    fn from(outcome: FetchOutcome) -> Self {
        match outcome {
            FetchOutcome::Downloaded { bytes } => Self::Downloaded { bytes },
            FetchOutcome::AlreadyPresent => Self::AlreadyPresent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    #[serde(flatten)]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub filter: String,
    pub transitions: Vec<State>,
    pub items: Vec<ItemOutcome>,
}

impl RunReport {
    pub fn state(&self) -> Option<State> {
        self.transitions.last().copied()
    }

    pub fn failures(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Failed { .. }))
            .count()
    }
}

#[derive(Default)]
struct Run {
    filter: String,
    transitions: Vec<State>,
    items: Vec<ItemOutcome>,
}

impl Run {
    fn enter(&mut self, state: State) {
        debug!("{:?} -> {:?}", self.transitions.last(), state);
        self.transitions.push(state);
    }

    fn into_report(self) -> RunReport {
        RunReport {
            filter: self.filter,
            transitions: self.transitions,
            items: self.items,
        }
    }
}

pub struct RetrievalDriver<F> {
    catalog: CatalogClient,
    tokens: TokenProvider,
    fetcher: F,
}

impl<F: AssetFetcher> RetrievalDriver<F> {
    pub fn new(catalog: CatalogClient, tokens: TokenProvider, fetcher: F) -> Self {
        Self {
            catalog,
            tokens,
            fetcher,
        }
    }

    /// Run the whole pipeline once. Fatal errors abort the run; a failed item
    /// is recorded in the report and the next item is processed.
    pub async fn run(&self, request: RetrievalRequest) -> Result<RunReport> {
        let mut run = Run::default();
        match self.drive(&mut run, request).await {
            Ok(()) => {
                run.enter(State::Done);
                Ok(run.into_report())
            }
            Err(e) => {
                run.enter(State::Failed(e.kind()));
                Err(e)
            }
        }
    }

    async fn drive(&self, run: &mut Run, request: RetrievalRequest) -> Result<()> {
        run.enter(State::Validating);
        let criteria = request.params.validate()?;
        info!("Collection : {}", criteria.collection);
        info!(
            "Prod.Type  : {}",
            criteria.product_type.as_deref().unwrap_or("-")
        );
        if criteria.product_type.is_some() && !criteria.collection.profile().product_type_filter {
            warn!(
                "{} has no product type attribute; the product type is ignored",
                criteria.collection
            );
        }

        run.enter(State::Searching);
        let filter = build_filter(&criteria);
        run.filter = filter.to_string();
        let result = self.catalog.search(&filter, request.top).await?;
        info!("{} products found", result.len());

        let (credentials, dest_dir) = match request.mode {
            Mode::List => {
                run.enter(State::ListOnly);
                for item in result.items {
                    info!("Found : {}", item.name);
                    run.items.push(ItemOutcome {
                        id: item.id,
                        name: item.name,
                        destination: None,
                        status: ItemStatus::Listed,
                    });
                }
                return Ok(());
            }
            Mode::Fetch {
                credentials,
                dest_dir,
            } => (credentials, dest_dir),
        };

        run.enter(State::Authenticating);
        let token = self.tokens.authenticate(&credentials).await?;
        drop(credentials);

        run.enter(State::Fetching);
        for item in result.items {
            let outcome = self.fetch_item(&item, &token, &dest_dir).await;
            run.items.push(outcome);
        }
        Ok(())
    }

    async fn fetch_item(
        &self,
        item: &CatalogItem,
        token: &BearerToken,
        dest_dir: &Path,
    ) -> ItemOutcome {
        let destination = archive_path(dest_dir, item);
        let status = match &destination {
            Ok(dest) => {
                info!("Download {}", item.name);
                let url = self.catalog.product_value_url(&item.id);
                self.fetcher.fetch(&url, token, dest).await
            }
            Err(e) => Err(Error::fetch(&item.id, e)),
        };

        let status = match status {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                warn!("{e}");
                ItemStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        ItemOutcome {
            id: item.id.clone(),
            name: item.name.clone(),
            destination: destination.ok(),
            status,
        }
    }
}

/// `dest_dir/<name>.zip`. Names that would escape `dest_dir` are refused.
pub fn archive_path(dest_dir: &Path, item: &CatalogItem) -> std::result::Result<PathBuf, String> {
    let name = item.name.as_str();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(format!("refusing to write product named {name:?}"));
    }
    Ok(dest_dir.join(format!("{name}{ARCHIVE_SUFFIX}")))
}
