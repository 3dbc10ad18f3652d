//! Cached resource collections
//!
//! Binds the REST collections (`competitors`, `icps`, `leads`, `campaigns`,
//! `insights`) to fetch and mutation controllers over one shared
//! [`QueryContext`]. Lists are cached under `"{kind}"` and items under
//! `"{kind}/{id}"`, so a mutation that invalidates `"{kind}"` reaches both.

use crate::api::ApiClient;
use agentview_core::ClientError;
use agentview_query::{
    keyed_loader, loader, mutator, FetchController, FetchOptions, MutationController, MutationOptions,
    QueryContext,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::str::FromStr;

/// REST resource collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Competitor profiles
    Competitors,
    /// Ideal customer profiles
    Icps,
    /// Sales leads
    Leads,
    /// Outreach campaigns
    Campaigns,
    /// Analysis insights
    Insights,
}

impl ResourceKind {
    /// Every collection
    pub const ALL: [Self; 5] = [
        Self::Competitors,
        Self::Icps,
        Self::Leads,
        Self::Campaigns,
        Self::Insights,
    ];

    /// Path segment and list cache key
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Competitors => "competitors",
            Self::Icps => "icps",
            Self::Leads => "leads",
            Self::Campaigns => "campaigns",
            Self::Insights => "insights",
        }
    }

    /// Cache key of the collection list
    #[must_use]
    pub fn list_key(self) -> String {
        self.as_str().to_string()
    }

    /// Cache key of one item
    #[must_use]
    pub fn item_key(self, id: &str) -> String {
        format!("{}/{id}", self.as_str())
    }

    /// Item id encoded in an item cache key of this collection
    #[must_use]
    pub fn item_id(self, key: &str) -> Option<&str> {
        key.strip_prefix(self.as_str())?
            .strip_prefix('/')
            .filter(|id| !id.is_empty())
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ClientError::Config(format!("unknown resource: {s}")))
    }
}

/// Factory for resource controllers sharing one cache
#[derive(Debug, Clone)]
pub struct Resources {
    api: ApiClient,
    context: QueryContext,
}

impl Resources {
    /// Bind an API client to a query context
    #[must_use]
    pub fn new(api: ApiClient, context: QueryContext) -> Self {
        Self { api, context }
    }

    /// Underlying API client
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Shared cache and revalidation signals
    #[must_use]
    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Controller for a collection list
    pub fn list<T>(&self, kind: ResourceKind, options: FetchOptions<Vec<T>>) -> FetchController<Vec<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let api = self.api.clone();
        FetchController::new(
            &self.context,
            Some(kind.list_key()),
            loader(move || {
                let api = api.clone();
                async move { api.list(kind).await }
            }),
            options,
        )
    }

    /// Controller for one item; `None` disables it
    ///
    /// The id is read back from the controller's key on every fetch, so
    /// switching items goes through `set_key(Some(kind.item_key(id)))`.
    pub fn item<T>(&self, kind: ResourceKind, id: Option<&str>, options: FetchOptions<T>) -> FetchController<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let api = self.api.clone();
        FetchController::new(
            &self.context,
            id.map(|id| kind.item_key(id)),
            keyed_loader(move |key: &str| {
                let api = api.clone();
                let item_id = kind.item_id(key).map(str::to_string);
                let key = key.to_string();
                async move {
                    let item_id = item_id
                        .ok_or_else(|| ClientError::Config(format!("not a {kind} item key: {key}")))?;
                    api.get(kind, &item_id).await
                }
            }),
            options,
        )
    }

    /// Controller that creates items
    pub fn create<B, T>(&self, kind: ResourceKind, options: MutationOptions<T>) -> MutationController<B, T>
    where
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let api = self.api.clone();
        MutationController::new(
            &self.context,
            mutator(move |body: B| {
                let api = api.clone();
                async move { api.create(kind, &body).await }
            }),
            invalidating(kind, options),
        )
    }

    /// Controller that updates items; the argument is `(id, body)`
    pub fn update<B, T>(&self, kind: ResourceKind, options: MutationOptions<T>) -> MutationController<(String, B), T>
    where
        B: Serialize + Send + Sync + 'static,
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let api = self.api.clone();
        MutationController::new(
            &self.context,
            mutator(move |(id, body): (String, B)| {
                let api = api.clone();
                async move { api.update(kind, &id, &body).await }
            }),
            invalidating(kind, options),
        )
    }

    /// Controller that deletes items by id
    pub fn delete(&self, kind: ResourceKind, options: MutationOptions<()>) -> MutationController<String, ()> {
        let api = self.api.clone();
        MutationController::new(
            &self.context,
            mutator(move |id: String| {
                let api = api.clone();
                async move { api.delete(kind, &id).await }
            }),
            invalidating(kind, options),
        )
    }
}

fn invalidating<T>(kind: ResourceKind, mut options: MutationOptions<T>) -> MutationOptions<T> {
    let key = kind.list_key();
    if !options.invalidate_keys.contains(&key) {
        options.invalidate_keys.push(key);
    }
    options
}
