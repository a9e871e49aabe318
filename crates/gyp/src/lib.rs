//! Reading and editing GYP build descriptors.
//!
//! GYP files are Python literals. They are parsed into an order-preserving
//! JSON tree, edited in place, and written back as pretty-printed JSON (which
//! GYP accepts as well). Fields that are not explicitly touched survive
//! unchanged, including their position.

mod parser;

use camino::{Utf8Path, Utf8PathBuf};
use chumsky::Parser;
use log::debug;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DescriptorError>;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {path}:{line}:{col}: {message}")]
    Parse {
        path: Utf8PathBuf,
        line: usize,
        col: usize,
        message: String,
    },

    #[error("Unexpected structure in {path}: {message}")]
    Shape { path: Utf8PathBuf, message: String },

    #[error("Json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DescriptorError {
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::Parse { path, .. }
            | Self::Shape { path, .. } => Some(path),
            Self::Json(_) => None,
        }
    }
}

/// A parsed build descriptor together with the file it came from
#[derive(Debug, Clone)]
pub struct GypFile {
    path: Utf8PathBuf,
    root: Map<String, Value>,
}

impl GypFile {
    /// Parses `source`; `path` is only used for error reporting and as the
    /// default location for [`Self::store`]
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Parse`] with the position of the first syntax error,
    /// or [`DescriptorError::Shape`] when the top level is not a dict
    pub fn parse(path: impl Into<Utf8PathBuf>, source: &str) -> Result<Self> {
        let path = path.into();
        let value = parser::parser().parse(source).map_err(|errors| {
            let (offset, message) = errors
                .into_iter()
                .next()
                .map_or((0, "invalid syntax".to_string()), |e| {
                    (e.span().start, e.to_string())
                });
            let (line, col) = line_col(source, offset);
            DescriptorError::Parse {
                path: path.clone(),
                line,
                col,
                message,
            }
        })?;

        match value {
            Value::Object(root) => Ok(Self { path, root }),
            other => Err(DescriptorError::Shape {
                path,
                message: format!("expected a dict at the top level, found {other}"),
            }),
        }
    }

    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading build descriptor {path}");
        let source = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(path, &source)
    }

    /// Writes back to the file this descriptor was loaded from
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written
    pub fn store(&self) -> Result<()> {
        self.store_as(&self.path)
    }

    /// # Errors
    ///
    /// Fails if the file cannot be written
    pub fn store_as(&self, path: impl AsRef<Utf8Path>) -> Result<()> {
        let path = path.as_ref();
        debug!("Writing build descriptor {path}");
        std::fs::write(path, self.to_pretty_string()?).map_err(|source| {
            DescriptorError::Write {
                path: path.to_owned(),
                source,
            }
        })
    }

    /// # Errors
    ///
    /// Only fails if serialization fails, which a parsed tree never does
    pub fn to_pretty_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.root)?)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.root
    }

    /// Mutable views on every dict in the top-level `targets` list. A
    /// descriptor without targets yields none.
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `targets` is not a list of dicts
    pub fn targets_mut(&mut self) -> Result<Vec<Target<'_>>> {
        let Self { path, root } = self;
        let path = path.as_path();
        let Some(targets) = root.get_mut("targets") else {
            return Ok(vec![]);
        };
        let Value::Array(targets) = targets else {
            return Err(shape(path, "`targets` must be a list"));
        };

        targets
            .iter_mut()
            .map(|target| match target {
                Value::Object(fields) => Ok(Target { path, fields }),
                other => Err(shape(path, format!("target must be a dict, found {other}"))),
            })
            .collect()
    }

    pub fn target_names(&self) -> Vec<String> {
        self.root
            .get("targets")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|t| t.get("target_name").and_then(Value::as_str))
            .map(String::from)
            .collect()
    }

    /// Appends to the top-level `dependencies` list, skipping entries that
    /// are already present. Returns how many were added.
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `dependencies` exists but is not a list
    pub fn append_dependencies<I, S>(&mut self, deps: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = list_mut(&mut self.root, "dependencies", &self.path)?;
        Ok(push_unique(list, deps))
    }

    /// Drops top-level `dependencies` entries for which `keep` returns false
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `dependencies` exists but is not a list
    pub fn retain_dependencies(&mut self, keep: impl Fn(&str) -> bool) -> Result<()> {
        let list = list_mut(&mut self.root, "dependencies", &self.path)?;
        list.retain(|dep| dep.as_str().is_none_or(&keep));
        Ok(())
    }

    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `includes` exists but is not a list
    pub fn add_include(&mut self, include: impl Into<String>) -> Result<()> {
        let list = list_mut(&mut self.root, "includes", &self.path)?;
        push_unique(list, [include]);
        Ok(())
    }

    /// Sets entries of the top-level `variables` dict, keeping every other
    /// variable as it was
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `variables` exists but is not a dict
    pub fn merge_variables<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let variables = self
            .root
            .entry("variables")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(variables) = variables else {
            return Err(shape(&self.path, "`variables` must be a dict"));
        };
        for (key, value) in vars {
            variables.insert(key.into(), Value::String(value.into()));
        }
        Ok(())
    }
}

/// A single entry of a descriptor's `targets` list
#[derive(Debug)]
pub struct Target<'a> {
    path: &'a Utf8Path,
    fields: &'a mut Map<String, Value>,
}

impl Target<'_> {
    pub fn name(&self) -> Option<&str> {
        self.fields.get("target_name").and_then(Value::as_str)
    }

    pub fn target_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn set_type(&mut self, target_type: &str) {
        self.set("type", target_type);
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String entries of a list field
    pub fn strings(&self, key: &str) -> Vec<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .collect()
    }

    /// Adds `value` to the list field `key` unless it is already present
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `key` holds something other than a list
    pub fn add_to_list(&mut self, key: &str, value: &str) -> Result<()> {
        let list = list_mut(self.fields, key, self.path)?;
        push_unique(list, [value]);
        Ok(())
    }

    /// Removes every occurrence of `value` from the list field `key`
    ///
    /// # Errors
    ///
    /// [`DescriptorError::Shape`] if `key` holds something other than a list
    pub fn remove_from_list(&mut self, key: &str, value: &str) -> Result<()> {
        let list = list_mut(self.fields, key, self.path)?;
        list.retain(|v| v.as_str() != Some(value));
        Ok(())
    }
}

fn shape(path: &Utf8Path, message: impl Into<String>) -> DescriptorError {
    DescriptorError::Shape {
        path: path.to_owned(),
        message: message.into(),
    }
}

fn list_mut<'m>(
    map: &'m mut Map<String, Value>,
    key: &str,
    path: &Utf8Path,
) -> Result<&'m mut Vec<Value>> {
    match map.entry(key).or_insert_with(|| Value::Array(vec![])) {
        Value::Array(items) => Ok(items),
        other => Err(shape(path, format!("`{key}` must be a list, found {other}"))),
    }
}

fn push_unique<I, S>(list: &mut Vec<Value>, values: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut added = 0;
    for value in values {
        let value = value.into();
        if !list.iter().any(|v| v.as_str() == Some(value.as_str())) {
            list.push(Value::String(value));
            added += 1;
        }
    }
    added
}

/// 1-based line and column of a char offset
fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for c in source.chars().take(offset) {
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
