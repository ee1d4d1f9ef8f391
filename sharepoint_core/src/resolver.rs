//! Resource URI resolution.
//!
//! Maps `sharepoint://` resource URIs onto the Graph calls that produce them.
//! URIs are matched against a small pattern table; each match names the kind
//! of resource and captures its parameters:
//!
//! ```rust,ignore
//! let uri = ResourceUri::parse("sharepoint://document/Shared Documents/reports/q1.xlsx")?;
//! assert_eq!(
//!     uri,
//!     ResourceUri::Document { library: "Shared Documents".into(), path: "reports/q1.xlsx".into() }
//! );
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::config::Settings;
use crate::documents::DocumentPayload;
use crate::error::SharePointError;
use crate::graph::GraphClient;

pub const URI_SCHEME: &str = "sharepoint://";

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceUri {
    SiteInfo,
    Documents { library: String },
    List { name: String },
    Document { library: String, path: String },
}

struct UriPattern {
    id: &'static str,
    pattern: Regex,
}

static PATTERNS: Lazy<Vec<UriPattern>> = Lazy::new(|| {
    let build = |id: &'static str, re: &str| UriPattern {
        id,
        pattern: Regex::new(re).expect("resource pattern must compile"),
    };
    vec![
        build("site-info", r"^(?:sharepoint://)?site-info/?$"),
        build("documents", r"^(?:sharepoint://)?documents/(?P<library>[^/]+)/?$"),
        build("list", r"^(?:sharepoint://)?list/(?P<name>[^/]+)/?$"),
        build(
            "document",
            r"^(?:sharepoint://)?document/(?P<library>[^/]+)/(?P<path>.+)$",
        ),
    ]
});

impl ResourceUri {
    pub fn parse(uri: &str) -> Result<Self, SharePointError> {
        let uri = uri.trim();
        for entry in PATTERNS.iter() {
            let Some(caps) = entry.pattern.captures(uri) else {
                continue;
            };
            let capture = |name: &str| -> Result<String, SharePointError> {
                let raw = caps.name(name).map(|m| m.as_str()).unwrap_or_default();
                let decoded = urlencoding::decode(raw)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                let trimmed = decoded.trim().trim_matches('/').to_string();
                if trimmed.is_empty() {
                    return Err(SharePointError::ResourceNotFound(format!(
                        "empty {} in '{}'",
                        name, uri
                    )));
                }
                Ok(trimmed)
            };
            return match entry.id {
                "site-info" => Ok(ResourceUri::SiteInfo),
                "documents" => Ok(ResourceUri::Documents {
                    library: capture("library")?,
                }),
                "list" => Ok(ResourceUri::List {
                    name: capture("name")?,
                }),
                _ => Ok(ResourceUri::Document {
                    library: capture("library")?,
                    path: capture("path")?,
                }),
            };
        }
        Err(SharePointError::ResourceNotFound(format!(
            "unrecognized resource uri '{}'",
            uri
        )))
    }
}

/// Where the configured site lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLocator {
    Id(String),
    Url { host: String, path: Option<String> },
}

impl SiteLocator {
    pub fn from_settings(settings: &Settings) -> Result<Self, SharePointError> {
        if let Some(id) = settings.site_id.as_deref().filter(|s| !s.is_empty()) {
            return Ok(SiteLocator::Id(id.to_string()));
        }
        let site_url = settings.site_url.as_deref().ok_or_else(|| {
            SharePointError::Configuration("SITE_URL or SITE_ID must be set".to_string())
        })?;
        Self::from_url(site_url)
    }

    pub fn from_url(site_url: &str) -> Result<Self, SharePointError> {
        let url = Url::parse(site_url).map_err(|e| {
            SharePointError::Configuration(format!("SITE_URL is not a valid URL: {}", e))
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| SharePointError::Configuration("SITE_URL has no host".to_string()))?
            .to_string();
        let path = url.path().trim_matches('/');
        Ok(SiteLocator::Url {
            host,
            path: (!path.is_empty()).then(|| path.to_string()),
        })
    }

    /// Graph path addressing the site.
    pub fn endpoint(&self) -> String {
        match self {
            SiteLocator::Id(id) => format!("sites/{}", id),
            SiteLocator::Url {
                host,
                path: Some(path),
            } => format!("sites/{}:/{}", host, path),
            SiteLocator::Url { host, path: None } => format!("sites/{}", host),
        }
    }
}

/// Identifiers produced while resolving one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceDescriptor {
    pub site_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum ResolvedContent {
    Site(Value),
    Documents(Vec<Value>),
    ListItems(Vec<Value>),
    Document(DocumentPayload),
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub uri: ResourceUri,
    pub descriptor: ResourceDescriptor,
    pub content: ResolvedContent,
    pub warnings: Vec<String>,
}

pub struct ResourceResolver {
    graph: Arc<GraphClient>,
    site: SiteLocator,
    strict: bool,
    site_id: OnceCell<String>,
    drives: NameCache,
    lists: NameCache,
}

/// Lowercased name to (id, number of objects the name matched).
type NameCache = std::sync::Mutex<HashMap<String, (String, usize)>>;

impl ResourceResolver {
    pub fn new(graph: Arc<GraphClient>, site: SiteLocator, strict: bool) -> Self {
        let site_id = match &site {
            SiteLocator::Id(id) => OnceCell::new_with(Some(id.clone())),
            SiteLocator::Url { .. } => OnceCell::new(),
        };
        Self {
            graph,
            site,
            strict,
            site_id,
            drives: std::sync::Mutex::new(HashMap::new()),
            lists: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(
        graph: Arc<GraphClient>,
        settings: &Settings,
    ) -> Result<Self, SharePointError> {
        Ok(Self::new(
            graph,
            SiteLocator::from_settings(settings)?,
            settings.strict_name_resolution,
        ))
    }

    pub fn graph(&self) -> &Arc<GraphClient> {
        &self.graph
    }

    pub async fn resolve(&self, uri: &str) -> Result<Resolution, SharePointError> {
        let parsed = ResourceUri::parse(uri)?;
        debug!(target: "sharepoint.resolver", uri, kind = ?parsed, "resolving resource");
        let mut warnings = Vec::new();

        let (descriptor, content) = match &parsed {
            ResourceUri::SiteInfo => {
                let site = self.site_info().await?;
                let descriptor = ResourceDescriptor {
                    site_id: text(&site, "id"),
                    name: text(&site, "displayName"),
                    ..Default::default()
                };
                (descriptor, ResolvedContent::Site(site))
            }
            ResourceUri::Documents { library } => {
                let site_id = self.site_id().await?;
                let drive_id = self.drive_id(&site_id, library, &mut warnings).await?;
                let items = self
                    .graph
                    .get_collection(&format!("drives/{}/root/children", drive_id))
                    .await
                    .map_err(not_found_as_resource)?;
                let descriptor = ResourceDescriptor {
                    site_id,
                    drive_id: Some(drive_id),
                    name: library.clone(),
                    ..Default::default()
                };
                (descriptor, ResolvedContent::Documents(items))
            }
            ResourceUri::List { name } => {
                let site_id = self.site_id().await?;
                let list_id = self.list_id(&site_id, name, &mut warnings).await?;
                let items = self
                    .graph
                    .get_collection(&format!(
                        "sites/{}/lists/{}/items?expand=fields",
                        site_id, list_id
                    ))
                    .await
                    .map_err(not_found_as_resource)?;
                let descriptor = ResourceDescriptor {
                    site_id,
                    list_id: Some(list_id),
                    name: name.clone(),
                    ..Default::default()
                };
                (descriptor, ResolvedContent::ListItems(items))
            }
            ResourceUri::Document { library, path } => {
                let site_id = self.site_id().await?;
                let drive_id = self.drive_id(&site_id, library, &mut warnings).await?;
                let (item_id, payload) = self.download(&drive_id, path).await?;
                let descriptor = ResourceDescriptor {
                    site_id,
                    drive_id: Some(drive_id),
                    item_id: Some(item_id),
                    name: payload.filename.clone(),
                    ..Default::default()
                };
                (descriptor, ResolvedContent::Document(payload))
            }
        };

        for warning in &warnings {
            warn!(target: "sharepoint.resolver", uri, "{}", warning);
        }

        Ok(Resolution {
            uri: parsed,
            descriptor,
            content,
            warnings,
        })
    }

    /// Site summary from a single site lookup.
    pub async fn site_info(&self) -> Result<Value, SharePointError> {
        let site = self
            .graph
            .get_json(&self.site.endpoint())
            .await
            .map_err(not_found_as_resource)?;
        if let Some(id) = site.get("id").and_then(Value::as_str) {
            let _ = self.site_id.set(id.to_string());
        }
        Ok(json!({
            "id": site.get("id"),
            "name": site.get("name"),
            "displayName": site.get("displayName"),
            "description": site.get("description"),
            "webUrl": site.get("webUrl"),
            "createdDateTime": site.get("createdDateTime"),
            "lastModifiedDateTime": site.get("lastModifiedDateTime"),
        }))
    }

    /// Graph id of the configured site, looked up once.
    pub async fn site_id(&self) -> Result<String, SharePointError> {
        self.site_id
            .get_or_try_init(|| async {
                let site = self
                    .graph
                    .get_json(&self.site.endpoint())
                    .await
                    .map_err(not_found_as_resource)?;
                site.get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| {
                        SharePointError::ResourceNotFound("site response has no id".to_string())
                    })
            })
            .await
            .cloned()
    }

    /// Drive id for a document library name.
    pub async fn drive_id(
        &self,
        site_id: &str,
        library: &str,
        warnings: &mut Vec<String>,
    ) -> Result<String, SharePointError> {
        let (id, matches) = match cached(&self.drives, library)? {
            Some(hit) => hit,
            None => {
                let drives = self
                    .graph
                    .get_collection(&format!("sites/{}/drives", site_id))
                    .await
                    .map_err(not_found_as_resource)?;
                let hit = self.pick("document library", library, &drives, &["name"])?;
                remember(&self.drives, library, &hit)?;
                hit
            }
        };
        note_ambiguity("document library", library, matches, warnings);
        Ok(id)
    }

    /// List id for a list display name.
    pub async fn list_id(
        &self,
        site_id: &str,
        name: &str,
        warnings: &mut Vec<String>,
    ) -> Result<String, SharePointError> {
        let (id, matches) = match cached(&self.lists, name)? {
            Some(hit) => hit,
            None => {
                let lists = self
                    .graph
                    .get_collection(&format!("sites/{}/lists", site_id))
                    .await
                    .map_err(not_found_as_resource)?;
                let hit = self.pick("list", name, &lists, &["displayName", "name"])?;
                remember(&self.lists, name, &hit)?;
                hit
            }
        };
        note_ambiguity("list", name, matches, warnings);
        Ok(id)
    }

    fn pick(
        &self,
        what: &str,
        wanted: &str,
        candidates: &[Value],
        fields: &[&str],
    ) -> Result<(String, usize), SharePointError> {
        let matches: Vec<&Value> = candidates
            .iter()
            .filter(|c| {
                fields.iter().any(|f| {
                    c.get(*f)
                        .and_then(Value::as_str)
                        .is_some_and(|v| v.eq_ignore_ascii_case(wanted))
                })
            })
            .collect();

        let first = match matches.as_slice() {
            [] => {
                return Err(SharePointError::ResourceNotFound(format!(
                    "{} '{}'",
                    what, wanted
                )))
            }
            [only] => only,
            [first, ..] => {
                if self.strict {
                    return Err(SharePointError::AmbiguousResource {
                        name: wanted.to_string(),
                        matches: matches.len(),
                    });
                }
                first
            }
        };

        first
            .get("id")
            .and_then(Value::as_str)
            .map(|id| (id.to_string(), matches.len()))
            .ok_or_else(|| SharePointError::ResourceNotFound(format!("{} '{}' has no id", what, wanted)))
    }

    async fn download(
        &self,
        drive_id: &str,
        path: &str,
    ) -> Result<(String, DocumentPayload), SharePointError> {
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        let item = self
            .graph
            .get_json(&format!("drives/{}/root:/{}", drive_id, encoded.join("/")))
            .await
            .map_err(not_found_as_resource)?;

        let Some(file) = item.get("file") else {
            return Err(SharePointError::ResourceNotFound(format!(
                "'{}' is not a file",
                path
            )));
        };
        let item_id = item
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SharePointError::ResourceNotFound(format!("'{}' has no id", path)))?;
        let filename = item
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| path.rsplit('/').next().unwrap_or(path).to_string());
        let declared_type = file
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_string);

        let response = self
            .graph
            .get_bytes(&format!("drives/{}/items/{}/content", drive_id, item_id))
            .await
            .map_err(not_found_as_resource)?;

        let payload = DocumentPayload {
            bytes: response.body,
            filename,
            content_type: declared_type.or(response.content_type),
        };
        Ok((item_id, payload))
    }
}

/// Cache hits repeat the warning so every resolution reports the ambiguity.
fn note_ambiguity(what: &str, wanted: &str, matches: usize, warnings: &mut Vec<String>) {
    if matches > 1 {
        warnings.push(format!(
            "{} '{}' matched {} objects; using the first",
            what, wanted, matches
        ));
    }
}

fn cached(map: &NameCache, name: &str) -> Result<Option<(String, usize)>, SharePointError> {
    let map = map
        .lock()
        .map_err(|e| SharePointError::Internal(format!("resolver cache poisoned: {}", e)))?;
    Ok(map.get(&name.to_lowercase()).cloned())
}

fn remember(map: &NameCache, name: &str, hit: &(String, usize)) -> Result<(), SharePointError> {
    map.lock()
        .map_err(|e| SharePointError::Internal(format!("resolver cache poisoned: {}", e)))?
        .insert(name.to_lowercase(), hit.clone());
    Ok(())
}

fn not_found_as_resource(err: SharePointError) -> SharePointError {
    match err {
        SharePointError::NotFound(msg) => SharePointError::ResourceNotFound(msg),
        other => other,
    }
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
