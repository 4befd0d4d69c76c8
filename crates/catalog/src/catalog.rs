use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
    tokio::sync::RwLock,
    tracing::info,
};

use crate::error::{Error, Result};

/// Required string fields of every catalog entry.
const REQUIRED_FIELDS: &[&str] = &["nombre", "descripcion"];

/// One command the frontend can offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub nombre: String,
    pub descripcion: String,
    /// Any other keys (`tipo_respuesta`, `ejemplo`, ...), kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandEntry {
    /// The `tipo_respuesta` hint, when it is a string.
    #[must_use]
    pub fn response_kind(&self) -> Option<&str> {
        self.extra.get("tipo_respuesta").and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    pub commands: Vec<CommandEntry>,
}

/// A catalog entry as listed over HTTP; `seccion` is only set when listing
/// across all sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccion: Option<String>,
    #[serde(flatten)]
    pub entry: CommandEntry,
}

struct Cached {
    mtime: Option<SystemTime>,
    sections: Arc<Vec<Section>>,
}

/// Lazily loaded catalog, re-read whenever the file's mtime changes.
pub struct CommandCatalog {
    path: PathBuf,
    cache: RwLock<Option<Cached>>,
}

impl CommandCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current sections, reading the file if it changed since the last load,
    /// nothing is cached yet, or `force` is set.
    pub async fn load(&self, force: bool) -> Result<Arc<Vec<Section>>> {
        let mtime = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().ok(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(self.path.clone()));
            },
            Err(e) => return Err(e.into()),
        };

        if !force
            && let Some(cached) = self.cache.read().await.as_ref()
            && cached.mtime == mtime
            && !cached.sections.is_empty()
        {
            return Ok(Arc::clone(&cached.sections));
        }

        let mut cache = self.cache.write().await;
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(self.path.clone()));
            },
            Err(e) => return Err(e.into()),
        };
        let sections = Arc::new(parse_catalog(&raw)?);
        info!(
            path = %self.path.display(),
            sections = sections.len(),
            "command catalog loaded"
        );
        *cache = Some(Cached {
            mtime,
            sections: Arc::clone(&sections),
        });
        Ok(sections)
    }

    pub async fn reload(&self) -> Result<Arc<Vec<Section>>> {
        self.load(true).await
    }

    /// Section names in file order.
    pub async fn sections(&self) -> Result<Vec<String>> {
        Ok(self.load(false).await?.iter().map(|s| s.name.clone()).collect())
    }

    /// Entries of `section` (trimmed, upper-cased), or every entry tagged
    /// with its section when `section` is `None` or blank.
    pub async fn list(&self, section: Option<&str>) -> Result<Vec<ListedCommand>> {
        let sections = self.load(false).await?;
        let wanted = section.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty());

        let listed = match wanted {
            Some(wanted) => sections
                .iter()
                .filter(|s| s.name == wanted)
                .flat_map(|s| s.commands.iter())
                .map(|entry| ListedCommand {
                    seccion: None,
                    entry: entry.clone(),
                })
                .collect(),
            None => sections
                .iter()
                .flat_map(|s| {
                    s.commands.iter().map(|entry| ListedCommand {
                        seccion: Some(s.name.clone()),
                        entry: entry.clone(),
                    })
                })
                .collect(),
        };
        Ok(listed)
    }

    /// Case-insensitive lookup by `nombre`, returning the owning section.
    pub async fn find(&self, name: &str) -> Result<Option<(String, CommandEntry)>> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }
        let sections = self.load(false).await?;
        Ok(sections.iter().find_map(|s| {
            s.commands
                .iter()
                .find(|c| c.nombre.to_lowercase() == needle)
                .map(|c| (s.name.clone(), c.clone()))
        }))
    }

    pub async fn response_kind_of(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .find(name)
            .await?
            .and_then(|(_, entry)| entry.response_kind().map(str::to_string)))
    }
}

/// Parse and validate the catalog document.
pub fn parse_catalog(raw: &str) -> Result<Vec<Section>> {
    let root: Map<String, Value> = serde_json::from_str(raw)?;
    let mut sections = Vec::with_capacity(root.len());

    for (name, value) in root {
        let Value::Array(items) = value else {
            return Err(Error::invalid(name, "section is not a list of commands"));
        };
        let mut commands = Vec::with_capacity(items.len());
        for item in items {
            let Value::Object(fields) = item else {
                return Err(Error::invalid(name, "command is not an object"));
            };
            if let Some(missing) = REQUIRED_FIELDS
                .iter()
                .find(|f| !fields.get(**f).is_some_and(Value::is_string))
            {
                return Err(Error::invalid(
                    name,
                    format!("command is missing '{missing}' or it is not a string"),
                ));
            }
            commands.push(serde_json::from_value(Value::Object(fields))?);
        }
        sections.push(Section { name, commands });
    }

    Ok(sections)
}
