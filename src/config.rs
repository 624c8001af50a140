//! Connection descriptors.
//!
//! A [`ConnectionSpec`] names exactly one way of obtaining a connection. Descriptors built in
//! code use the constructors; descriptors read from configuration go through
//! [`ConnectionSpec::from_json_str`], which settles the shape once, up front.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::driver::{self, Connection, DataSource, Properties};
use crate::error::SqlContextError;

/// Function that opens a connection from the remaining descriptor parameters.
pub type ConnectionFactory =
    Arc<dyn Fn(&Properties) -> Result<Box<dyn Connection>, SqlContextError> + Send + Sync>;

#[derive(Clone)]
pub enum ConnectionSpec {
    /// Call `factory` with `params` (the descriptor minus the factory itself).
    Factory {
        factory: ConnectionFactory,
        params: Properties,
    },
    /// Look up the driver registered for `subprotocol` and connect to `subname`.
    Driver {
        subprotocol: String,
        subname: String,
        properties: Properties,
    },
    DataSource(Arc<dyn DataSource>),
    DataSourceWithCredentials {
        datasource: Arc<dyn DataSource>,
        username: String,
        password: String,
    },
    /// Resolve `name` through the installed naming context.
    Directory {
        name: String,
        environment: Properties,
    },
}

impl ConnectionSpec {
    pub fn factory<F>(factory: F, params: Properties) -> Self
    where
        F: Fn(&Properties) -> Result<Box<dyn Connection>, SqlContextError> + Send + Sync + 'static,
    {
        ConnectionSpec::Factory {
            factory: Arc::new(factory),
            params,
        }
    }

    pub fn driver(subprotocol: impl Into<String>, subname: impl Into<String>) -> Self {
        ConnectionSpec::Driver {
            subprotocol: subprotocol.into(),
            subname: subname.into(),
            properties: Properties::new(),
        }
    }

    #[cfg(feature = "sqlite")]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::driver("sqlite", path)
    }

    pub fn datasource(datasource: Arc<dyn DataSource>) -> Self {
        ConnectionSpec::DataSource(datasource)
    }

    pub fn datasource_with_credentials(
        datasource: Arc<dyn DataSource>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        ConnectionSpec::DataSourceWithCredentials {
            datasource,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn directory(name: impl Into<String>, environment: Properties) -> Self {
        ConnectionSpec::Directory {
            name: name.into(),
            environment,
        }
    }

    /// Add a driver property (`user`, `password`, ...). Ignored by the other shapes.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ConnectionSpec::Driver { properties, .. } = &mut self {
            properties.insert(key.into(), value.into());
        }
        self
    }

    /// Parse a descriptor from JSON.
    ///
    /// Recognized objects: `{"subprotocol", "subname", ...}` (remaining keys become driver
    /// properties, except `name` and `environment`) and `{"name", "environment"?}`.
    ///
    /// # Errors
    /// Returns [`SqlContextError::ConfigError`] if the text is not JSON or the object matches
    /// no shape, or more than one.
    pub fn from_json_str(text: &str) -> Result<Self, SqlContextError> {
        let raw: RawSpec = serde_json::from_str(text)
            .map_err(|e| SqlContextError::ConfigError(format!("invalid descriptor: {e}")))?;
        raw.into_spec()
    }

    /// Parse a descriptor from an already-decoded JSON value.
    ///
    /// # Errors
    /// Same as [`ConnectionSpec::from_json_str`].
    pub fn from_json(value: JsonValue) -> Result<Self, SqlContextError> {
        let raw: RawSpec = serde_json::from_value(value)
            .map_err(|e| SqlContextError::ConfigError(format!("invalid descriptor: {e}")))?;
        raw.into_spec()
    }

    /// Open a connection for this descriptor.
    ///
    /// # Errors
    /// Returns whatever the factory, driver, data source or directory lookup reports.
    pub fn connect(&self) -> Result<Box<dyn Connection>, SqlContextError> {
        match self {
            ConnectionSpec::Factory { factory, params } => factory(params),
            ConnectionSpec::Driver {
                subprotocol,
                subname,
                properties,
            } => driver::driver_for(subprotocol)?.connect(subname, properties),
            ConnectionSpec::DataSource(datasource) => datasource.connect(),
            ConnectionSpec::DataSourceWithCredentials {
                datasource,
                username,
                password,
            } => datasource.connect_as(username, password),
            ConnectionSpec::Directory { name, environment } => {
                driver::naming_context()?.lookup(name, environment)?.connect()
            }
        }
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSpec::Factory { params, .. } => f
                .debug_struct("Factory")
                .field("params", params)
                .finish_non_exhaustive(),
            ConnectionSpec::Driver {
                subprotocol,
                subname,
                ..
            } => f
                .debug_struct("Driver")
                .field("subprotocol", subprotocol)
                .field("subname", subname)
                .finish_non_exhaustive(),
            ConnectionSpec::DataSource(_) => f.write_str("DataSource"),
            ConnectionSpec::DataSourceWithCredentials { username, .. } => f
                .debug_struct("DataSourceWithCredentials")
                .field("username", username)
                .finish_non_exhaustive(),
            ConnectionSpec::Directory { name, .. } => {
                f.debug_struct("Directory").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSpec {
    subprotocol: Option<String>,
    subname: Option<String>,
    name: Option<String>,
    environment: Option<Properties>,
    #[serde(flatten)]
    rest: serde_json::Map<String, JsonValue>,
}

impl RawSpec {
    fn into_spec(self) -> Result<ConnectionSpec, SqlContextError> {
        let is_driver = self.subprotocol.is_some() && self.subname.is_some();
        match (is_driver, self.name) {
            (true, Some(_)) => Err(SqlContextError::ConfigError(
                "descriptor is ambiguous: both subprotocol/subname and name are present".into(),
            )),
            (true, None) if self.environment.is_some() => Err(SqlContextError::ConfigError(
                "descriptor is ambiguous: environment belongs to a name lookup, not \
                 subprotocol/subname"
                    .into(),
            )),
            (true, None) => {
                let mut properties = Properties::new();
                for (key, value) in self.rest {
                    let value = match value {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    };
                    properties.insert(key, value);
                }
                Ok(ConnectionSpec::Driver {
                    subprotocol: self.subprotocol.unwrap_or_default(),
                    subname: self.subname.unwrap_or_default(),
                    properties,
                })
            }
            (false, Some(name)) => Ok(ConnectionSpec::Directory {
                name,
                environment: self.environment.unwrap_or_default(),
            }),
            (false, None) => {
                let mut keys: Vec<&str> = self.rest.keys().map(String::as_str).collect();
                if self.subprotocol.is_some() {
                    keys.push("subprotocol");
                }
                if self.subname.is_some() {
                    keys.push("subname");
                }
                Err(SqlContextError::ConfigError(format!(
                    "descriptor matches no connection shape (keys: {keys:?}); expected \
                     subprotocol+subname or name"
                )))
            }
        }
    }
}
