//! High-level InfluxDB client.
//!
//! [`Client`] wraps a [`Transport`] with database and retention policy
//! management, typed writes through [`encode`](crate::encode()) and typed
//! queries through [`decode`](crate::decode()). Preconditions (database and
//! retention policy existence) are checked with a `SHOW` query before the
//! operation itself, so a missing database is reported as
//! [`ClientError::UnknownDatabase`] rather than a server error string.
//!
//! Operations that take no database argument act on the database selected
//! with [`Client::use_database`].

use tracing::{debug, info};

use crate::decode::{decode_response, points_from_result};
use crate::encode::encode_default;
use crate::error::{ClientError, DecodeError, Result};
use crate::point::Point;
use crate::resolver::Resolver;
use crate::result::QueryResponse;
use crate::retention::{self, RetentionPolicy, RetentionPolicyRow, quote_identifier};
use crate::shape::Measurement;
use crate::transport::{ServerInfo, Transport};

#[cfg(feature = "http")]
use crate::transport::{ClientConfig, HttpTransport};

/// Name of the server's own monitoring database.
pub const INTERNAL_DATABASE: &str = "_internal";

/// One row of `SHOW DATABASES`.
#[derive(Debug, Default, crate::Measurement)]
#[influx(measurement = "databases")]
struct DatabaseRow {
    #[influx(field)]
    name: String,
}

/// InfluxDB client over a [`Transport`].
#[derive(Debug)]
pub struct Client<T: Transport> {
    transport: T,
    server: ServerInfo,
    database: Option<String>,
}

#[cfg(feature = "http")]
impl Client<HttpTransport> {
    /// Connects to the server described by `config` over HTTP.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the HTTP client cannot be built or the
    /// server does not answer the ping.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        Self::new(HttpTransport::new(config)?)
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client over `transport`, pinging the server once.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the server cannot be reached.
    pub fn new(transport: T) -> Result<Self> {
        let server = transport.ping()?;
        info!(
            url = transport.url(),
            version = %server.version,
            build = %server.build,
            "connected to InfluxDB"
        );
        Ok(Self {
            transport,
            server,
            database: None,
        })
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Server identity reported when the client connected.
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    // ---- databases ----

    /// Lists every database, including the internal one.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` or `DecodeError` if the listing fails.
    pub fn databases(&self) -> Result<Vec<String>> {
        let response = self.transport.query(None, "SHOW DATABASES")?;
        let names: Vec<String> = decode_response::<DatabaseRow>(&response)?
            .into_iter()
            .map(|row| row.name)
            .collect();
        debug!(databases = ?names, "listed databases");
        Ok(names)
    }

    /// Returns `true` if `name` exists.
    ///
    /// # Errors
    ///
    /// Same as [`Client::databases`].
    pub fn database_exists(&self, name: &str) -> Result<bool> {
        Ok(self.databases()?.iter().any(|db| db == name))
    }

    /// Creates a database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::DatabaseAlreadyExists` if it exists.
    pub fn create_database(&self, name: &str) -> Result<()> {
        if self.database_exists(name)? {
            return Err(ClientError::DatabaseAlreadyExists {
                name: name.to_string(),
            }
            .into());
        }
        self.transport
            .execute(&format!("CREATE DATABASE {}", quote_identifier(name)))?;
        info!(database = name, "created database");
        Ok(())
    }

    /// Drops a database. Deselects it if it was the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InternalDatabase` for `_internal` and
    /// `ClientError::UnknownDatabase` if it does not exist.
    pub fn drop_database(&mut self, name: &str) -> Result<()> {
        if name == INTERNAL_DATABASE {
            return Err(ClientError::InternalDatabase {
                name: name.to_string(),
            }
            .into());
        }
        self.ensure_database(name)?;
        self.transport
            .execute(&format!("DROP DATABASE {}", quote_identifier(name)))?;
        if self.database.as_deref() == Some(name) {
            self.database = None;
        }
        info!(database = name, "dropped database");
        Ok(())
    }

    /// Selects the database used by operations without a database argument.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnknownDatabase` if it does not exist.
    pub fn use_database(&mut self, name: &str) -> Result<()> {
        self.ensure_database(name)?;
        self.database = Some(name.to_string());
        debug!(database = name, "selected database");
        Ok(())
    }

    /// The selected database, if any.
    pub fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    // ---- retention policies ----

    /// Lists the retention policies of `database`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnknownDatabase` if the database does not exist
    /// and `ClientError::InvalidDuration` if the server reports a duration
    /// that cannot be parsed.
    pub fn retention_policies(&self, database: &str) -> Result<Vec<RetentionPolicy>> {
        self.ensure_database(database)?;
        let statement = format!("SHOW RETENTION POLICIES ON {}", quote_identifier(database));
        let response = self.transport.query(Some(database), &statement)?;
        decode_response::<RetentionPolicyRow>(&response)?
            .into_iter()
            .map(RetentionPolicy::try_from)
            .collect()
    }

    /// Looks up one retention policy of `database`.
    ///
    /// # Errors
    ///
    /// Same as [`Client::retention_policies`].
    pub fn retention_policy(&self, name: &str, database: &str) -> Result<Option<RetentionPolicy>> {
        Ok(self
            .retention_policies(database)?
            .into_iter()
            .find(|rp| rp.name == name))
    }

    /// Returns `true` if `database` has a retention policy called `name`.
    ///
    /// # Errors
    ///
    /// Same as [`Client::retention_policies`].
    pub fn retention_policy_exists(&self, name: &str, database: &str) -> Result<bool> {
        Ok(self.retention_policy(name, database)?.is_some())
    }

    /// Creates `policy` on `database`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::RetentionPolicyAlreadyExists` if a policy with
    /// the same name exists.
    pub fn create_retention_policy(&self, policy: &RetentionPolicy, database: &str) -> Result<()> {
        if self.retention_policy_exists(&policy.name, database)? {
            return Err(ClientError::RetentionPolicyAlreadyExists {
                name: policy.name.clone(),
                database: database.to_string(),
            }
            .into());
        }
        self.transport.execute(&policy.create_statement(database))?;
        info!(database, retention_policy = %policy.name, "created retention policy");
        Ok(())
    }

    /// Replaces the definition of the policy `name` with `policy`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnknownRetentionPolicy` if `name` does not exist.
    pub fn alter_retention_policy(&self, name: &str, database: &str, policy: &RetentionPolicy) -> Result<()> {
        self.ensure_retention_policy(name, database)?;
        self.transport.execute(&policy.alter_statement(name, database))?;
        info!(database, retention_policy = name, "altered retention policy");
        Ok(())
    }

    /// Drops the policy `name` from `database`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnknownRetentionPolicy` if it does not exist.
    pub fn drop_retention_policy(&self, name: &str, database: &str) -> Result<()> {
        self.ensure_retention_policy(name, database)?;
        self.transport
            .execute(&retention::drop_statement(name, database))?;
        info!(database, retention_policy = name, "dropped retention policy");
        Ok(())
    }

    /// [`Client::retention_policies`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn retention_policies_in_current(&self) -> Result<Vec<RetentionPolicy>> {
        self.retention_policies(self.selected()?)
    }

    /// [`Client::retention_policy`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn retention_policy_in_current(&self, name: &str) -> Result<Option<RetentionPolicy>> {
        self.retention_policy(name, self.selected()?)
    }

    /// [`Client::retention_policy_exists`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn retention_policy_exists_in_current(&self, name: &str) -> Result<bool> {
        self.retention_policy_exists(name, self.selected()?)
    }

    /// [`Client::create_retention_policy`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn create_retention_policy_in_current(&self, policy: &RetentionPolicy) -> Result<()> {
        self.create_retention_policy(policy, self.selected()?)
    }

    /// [`Client::alter_retention_policy`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn alter_retention_policy_in_current(&self, name: &str, policy: &RetentionPolicy) -> Result<()> {
        self.alter_retention_policy(name, self.selected()?, policy)
    }

    /// [`Client::drop_retention_policy`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn drop_retention_policy_in_current(&self, name: &str) -> Result<()> {
        self.drop_retention_policy(name, self.selected()?)
    }

    // ---- writes ----

    /// Writes `object` to the current database under its shape's measurement.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected,
    /// plus the errors of [`Client::write_to`].
    pub fn write<M: Measurement>(&self, object: &M) -> Result<()> {
        self.write_to(self.selected()?, object, None)
    }

    /// Writes `object` to `database`, optionally under a retention policy.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the database or policy does not exist,
    /// `ShapeError`/`EncodeError` if the object cannot be encoded and
    /// `TransportError` if the server rejects the write.
    pub fn write_to<M: Measurement>(&self, database: &str, object: &M, retention_policy: Option<&str>) -> Result<()> {
        let point = encode_default(object)?;
        self.write_points(database, &[point], retention_policy)
    }

    /// Writes `object` to the current database under `retention_policy`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected,
    /// plus the errors of [`Client::write_to`].
    pub fn write_with_policy<M: Measurement>(&self, object: &M, retention_policy: &str) -> Result<()> {
        self.write_to(self.selected()?, object, Some(retention_policy))
    }

    /// Writes every object of `objects` to the current database in one batch.
    ///
    /// # Errors
    ///
    /// Same as [`Client::write`].
    pub fn write_all<M: Measurement>(&self, objects: &[M]) -> Result<()> {
        self.write_all_to(self.selected()?, objects, None)
    }

    /// Writes every object of `objects` to the current database under
    /// `retention_policy`, in one batch.
    ///
    /// # Errors
    ///
    /// Same as [`Client::write_with_policy`].
    pub fn write_all_with_policy<M: Measurement>(&self, objects: &[M], retention_policy: &str) -> Result<()> {
        self.write_all_to(self.selected()?, objects, Some(retention_policy))
    }

    /// Writes every object of `objects` to `database` in one batch.
    ///
    /// # Errors
    ///
    /// Same as [`Client::write_to`].
    pub fn write_all_to<M: Measurement>(
        &self,
        database: &str,
        objects: &[M],
        retention_policy: Option<&str>,
    ) -> Result<()> {
        let points = objects
            .iter()
            .map(encode_default)
            .collect::<Result<Vec<_>>>()?;
        self.write_points(database, &points, retention_policy)
    }

    /// Writes one point.
    ///
    /// # Errors
    ///
    /// Same as [`Client::write_points`].
    pub fn write_point(&self, database: &str, point: &Point, retention_policy: Option<&str>) -> Result<()> {
        self.write_points(database, std::slice::from_ref(point), retention_policy)
    }

    /// [`Client::write_point`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn write_point_in_current(&self, point: &Point, retention_policy: Option<&str>) -> Result<()> {
        self.write_point(self.selected()?, point, retention_policy)
    }

    /// [`Client::write_points`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected,
    /// even for an empty batch.
    pub fn write_points_in_current(&self, points: &[Point], retention_policy: Option<&str>) -> Result<()> {
        self.write_points(self.selected()?, points, retention_policy)
    }

    /// Writes a batch of points. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the database or policy does not exist,
    /// `LineProtocolError` if the points cannot be serialized and
    /// `TransportError` if the server rejects the write.
    pub fn write_points(&self, database: &str, points: &[Point], retention_policy: Option<&str>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        match retention_policy {
            Some(rp) => self.ensure_retention_policy(rp, database)?,
            None => self.ensure_database(database)?,
        }
        self.transport.write(database, retention_policy, points)?;
        debug!(database, retention_policy, points = points.len(), "wrote points");
        Ok(())
    }

    // ---- queries ----

    /// Runs `statement` against `database` and returns the checked response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::UnknownDatabase` if the database does not exist
    /// and `DecodeError::QueryExecution` if the server reports an error.
    pub fn query_raw(&self, database: &str, statement: &str) -> Result<QueryResponse> {
        self.ensure_database(database)?;
        let response = self.transport.query(Some(database), statement)?;
        response.check()?;
        Ok(response)
    }

    /// Runs `statement` against `database` and decodes every row into `M`.
    ///
    /// # Errors
    ///
    /// Same as [`Client::query_raw`], plus any decoding error.
    pub fn query_as<M: Measurement>(&self, database: &str, statement: &str) -> Result<Vec<M>> {
        decode_response(&self.query_raw(database, statement)?)
    }

    /// Runs `statement` and decodes its single row, if any.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::MultipleRows` if the statements yield more than
    /// one row in total, and the errors of [`Client::query_as`].
    pub fn query_one<M: Measurement>(&self, database: &str, statement: &str) -> Result<Option<M>> {
        let mut rows = self.query_as::<M>(database, statement)?;
        if rows.len() > 1 {
            return Err(DecodeError::MultipleRows { rows: rows.len() }.into());
        }
        Ok(rows.pop())
    }

    /// Reads every point of `M`'s measurement in `database`.
    ///
    /// # Errors
    ///
    /// Same as [`Client::query_as`], plus `ShapeError` for an invalid shape.
    pub fn all_points<M: Measurement>(&self, database: &str) -> Result<Vec<M>> {
        let descriptor = Resolver::global().resolve::<M>()?;
        let statement = format!("SELECT * FROM {}", quote_identifier(&descriptor.name));
        self.query_as(database, &statement)
    }

    /// [`Client::all_points`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn all_points_in_current<M: Measurement>(&self) -> Result<Vec<M>> {
        self.all_points(self.selected()?)
    }

    /// Reads every row of `measurement` as untyped points.
    ///
    /// The query groups by every tag so tags come back as series tags and
    /// are not mistaken for text fields.
    ///
    /// # Errors
    ///
    /// Same as [`Client::query_as`].
    pub fn all_points_raw(&self, database: &str, measurement: &str) -> Result<Vec<Point>> {
        let statement = format!("SELECT * FROM {} GROUP BY *", quote_identifier(measurement));
        let response = self.query_raw(database, &statement)?;
        let mut points = Vec::new();
        for result in &response.results {
            points.extend(points_from_result(result)?);
        }
        Ok(points)
    }

    /// [`Client::all_points_raw`] on the current database.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoDatabaseSelected` if no database is selected.
    pub fn all_points_raw_in_current(&self, measurement: &str) -> Result<Vec<Point>> {
        self.all_points_raw(self.selected()?, measurement)
    }

    // ---- preconditions ----

    fn selected(&self) -> Result<&str> {
        self.database
            .as_deref()
            .ok_or_else(|| ClientError::NoDatabaseSelected.into())
    }

    fn ensure_database(&self, name: &str) -> Result<()> {
        if self.database_exists(name)? {
            Ok(())
        } else {
            Err(ClientError::UnknownDatabase {
                name: name.to_string(),
            }
            .into())
        }
    }

    fn ensure_retention_policy(&self, name: &str, database: &str) -> Result<()> {
        if self.retention_policy_exists(name, database)? {
            Ok(())
        } else {
            Err(ClientError::UnknownRetentionPolicy {
                name: name.to_string(),
                database: database.to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FluxError;
    use crate::result::{QueryResponse, QueryResult, Series};
    use serde_json::json;
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    /// Scripted server: a database list, canned `SELECT` results (one per
    /// statement), and a log of queries, executed statements and written
    /// points.
    #[derive(Default)]
    struct FakeTransport {
        databases: RefCell<BTreeSet<String>>,
        select: Vec<QueryResult>,
        queried: RefCell<Vec<String>>,
        executed: RefCell<Vec<String>>,
        written: RefCell<Vec<(String, Option<String>, Vec<Point>)>>,
    }

    impl FakeTransport {
        fn with_databases(names: &[&str]) -> Self {
            Self {
                databases: RefCell::new(names.iter().map(|n| (*n).to_string()).collect()),
                ..Self::default()
            }
        }
    }

    impl Transport for FakeTransport {
        fn url(&self) -> &str {
            "fake://"
        }

        fn ping(&self) -> Result<ServerInfo> {
            Ok(ServerInfo {
                version: "1.8.10".into(),
                build: "OSS".into(),
            })
        }

        fn query(&self, _database: Option<&str>, statement: &str) -> Result<QueryResponse> {
            let results = if statement == "SHOW DATABASES" {
                let mut series = Series::new("databases", &["name"]);
                for name in self.databases.borrow().iter() {
                    series = series.with_row(vec![json!(name)]);
                }
                vec![QueryResult::from_series(vec![series])]
            } else if statement.starts_with("SHOW RETENTION POLICIES") {
                vec![QueryResult::from_series(vec![
                    Series::new("", &["name", "duration", "shardGroupDuration", "replicaN", "default"])
                        .with_row(vec![json!("autogen"), json!("0s"), json!("168h0m0s"), json!(1), json!(true)]),
                ])]
            } else {
                self.queried.borrow_mut().push(statement.to_string());
                if self.select.is_empty() {
                    vec![QueryResult::default()]
                } else {
                    self.select.clone()
                }
            };
            Ok(QueryResponse { results, error: None })
        }

        fn execute(&self, statement: &str) -> Result<()> {
            if let Some(name) = statement.strip_prefix("CREATE DATABASE ") {
                self.databases.borrow_mut().insert(name.trim_matches('"').to_string());
            }
            self.executed.borrow_mut().push(statement.to_string());
            Ok(())
        }

        fn write(&self, database: &str, retention_policy: Option<&str>, points: &[Point]) -> Result<()> {
            self.written.borrow_mut().push((
                database.to_string(),
                retention_policy.map(str::to_string),
                points.to_vec(),
            ));
            Ok(())
        }
    }

    #[derive(Debug, Default, PartialEq, crate::Measurement)]
    #[influx(measurement = "cpu")]
    struct Cpu {
        #[influx(tag)]
        host: String,
        #[influx(field)]
        usage: f64,
    }

    fn client(databases: &[&str]) -> Client<FakeTransport> {
        Client::new(FakeTransport::with_databases(databases)).unwrap()
    }

    #[test]
    fn test_new_records_server_info() {
        let client = client(&[]);
        assert_eq!(client.server().version, "1.8.10");
        assert_eq!(client.current_database(), None);
    }

    #[test]
    fn test_databases_decoded_through_mapping() {
        let client = client(&["_internal", "telemetry"]);
        assert_eq!(client.databases().unwrap(), ["_internal", "telemetry"]);
        assert!(client.database_exists("telemetry").unwrap());
        assert!(!client.database_exists("nope").unwrap());
    }

    #[test]
    fn test_create_database() {
        let client = client(&["_internal"]);
        client.create_database("telemetry").unwrap();
        assert!(client.database_exists("telemetry").unwrap());

        let result = client.create_database("telemetry");
        assert!(matches!(
            result,
            Err(FluxError::Client(ClientError::DatabaseAlreadyExists { .. }))
        ));
    }

    #[test]
    fn test_drop_database_guards() {
        let mut client = client(&["_internal", "telemetry"]);

        assert!(matches!(
            client.drop_database("_internal"),
            Err(FluxError::Client(ClientError::InternalDatabase { .. }))
        ));
        assert!(matches!(
            client.drop_database("nope"),
            Err(FluxError::Client(ClientError::UnknownDatabase { .. }))
        ));

        client.use_database("telemetry").unwrap();
        client.drop_database("telemetry").unwrap();
        assert_eq!(client.current_database(), None);
        assert_eq!(
            client.transport().executed.borrow().last().map(String::as_str),
            Some(r#"DROP DATABASE "telemetry""#)
        );
    }

    #[test]
    fn test_use_database_requires_existing() {
        let mut client = client(&["telemetry"]);
        assert!(matches!(
            client.use_database("nope"),
            Err(FluxError::Client(ClientError::UnknownDatabase { ref name })) if name == "nope"
        ));
        client.use_database("telemetry").unwrap();
        assert_eq!(client.current_database(), Some("telemetry"));
    }

    #[test]
    fn test_current_database_operations_require_selection() {
        let client = client(&["telemetry"]);
        assert!(matches!(
            client.write(&Cpu::default()),
            Err(FluxError::Client(ClientError::NoDatabaseSelected))
        ));
        assert!(matches!(
            client.retention_policies_in_current(),
            Err(FluxError::Client(ClientError::NoDatabaseSelected))
        ));
        assert!(matches!(
            client.all_points_in_current::<Cpu>(),
            Err(FluxError::Client(ClientError::NoDatabaseSelected))
        ));
    }

    #[test]
    fn test_current_database_writes_require_selection() {
        let client = client(&["telemetry"]);
        let point = Point::builder("m").field("v", 1).build().unwrap();
        let no_database = |result: Result<()>| {
            matches!(result, Err(FluxError::Client(ClientError::NoDatabaseSelected)))
        };

        assert!(no_database(client.write_point_in_current(&point, None)));
        assert!(no_database(client.write_points_in_current(&[point.clone()], None)));
        assert!(no_database(client.write_points_in_current(&[], None)));
        assert!(no_database(client.write_with_policy(&Cpu::default(), "autogen")));
        assert!(no_database(client.write_all_with_policy(&[Cpu::default()], "autogen")));
        assert!(matches!(
            client.all_points_raw_in_current("m"),
            Err(FluxError::Client(ClientError::NoDatabaseSelected))
        ));
        assert!(client.transport().written.borrow().is_empty());
    }

    #[test]
    fn test_current_database_writes_with_policy() {
        let mut client = client(&["telemetry"]);
        client.use_database("telemetry").unwrap();
        let cpu = Cpu {
            host: "a".into(),
            usage: 0.5,
        };

        client.write_with_policy(&cpu, "autogen").unwrap();
        client.write_all_with_policy(&[cpu], "autogen").unwrap();
        let point = Point::builder("m").field("v", 1).build().unwrap();
        client.write_point_in_current(&point, None).unwrap();
        assert!(matches!(
            client.write_all_with_policy(&[Cpu::default()], "week"),
            Err(FluxError::Client(ClientError::UnknownRetentionPolicy { .. }))
        ));

        let written = client.transport().written.borrow();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0].0, "telemetry");
        assert_eq!(written[0].1.as_deref(), Some("autogen"));
        assert_eq!(written[1].1.as_deref(), Some("autogen"));
        assert_eq!(written[2].1, None);
    }

    #[test]
    fn test_all_points_raw_groups_by_tags() {
        let mut transport = FakeTransport::with_databases(&["telemetry"]);
        transport.select = vec![QueryResult::from_series(vec![
            Series::new("cpu", &["time", "usage"])
                .with_tag("host", "a")
                .with_row(vec![json!("2023-11-14T22:13:20Z"), json!(0.5)]),
        ])];
        let mut client = Client::new(transport).unwrap();
        client.use_database("telemetry").unwrap();

        let points = client.all_points_raw_in_current("cpu").unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].tag("host"), Some("a"));
        assert_eq!(points[0].field("host"), None);
        assert_eq!(
            client.transport().queried.borrow().last().map(String::as_str),
            Some(r#"SELECT * FROM "cpu" GROUP BY *"#)
        );
    }

    #[test]
    fn test_queries_read_every_statement_result() {
        let mut transport = FakeTransport::with_databases(&["telemetry"]);
        transport.select = vec![
            QueryResult::from_series(vec![
                Series::new("cpu", &["time", "host", "usage"])
                    .with_row(vec![json!("2023-11-14T22:13:20Z"), json!("a"), json!(0.5)]),
            ]),
            QueryResult::from_series(vec![
                Series::new("cpu", &["time", "host", "usage"])
                    .with_row(vec![json!("2023-11-14T22:13:21Z"), json!("b"), json!(0.25)]),
            ]),
        ];
        let client = Client::new(transport).unwrap();

        assert_eq!(client.all_points::<Cpu>("telemetry").unwrap().len(), 2);
        assert_eq!(client.all_points_raw("telemetry", "cpu").unwrap().len(), 2);
        assert!(matches!(
            client.query_one::<Cpu>("telemetry", "SELECT * FROM cpu; SELECT * FROM cpu"),
            Err(FluxError::Decode(DecodeError::MultipleRows { rows: 2 }))
        ));
    }

    #[test]
    fn test_retention_policy_lifecycle() {
        let client = client(&["telemetry"]);

        let policies = client.retention_policies("telemetry").unwrap();
        assert_eq!(policies.len(), 1);
        assert!(policies[0].is_default);

        let week = RetentionPolicy::new("week", std::time::Duration::from_secs(604_800));
        client.create_retention_policy(&week, "telemetry").unwrap();
        assert!(matches!(
            client.create_retention_policy(&RetentionPolicy::new("autogen", week.duration), "telemetry"),
            Err(FluxError::Client(ClientError::RetentionPolicyAlreadyExists { .. }))
        ));

        client.alter_retention_policy("autogen", "telemetry", &week).unwrap();
        assert!(matches!(
            client.drop_retention_policy("week", "telemetry"),
            Err(FluxError::Client(ClientError::UnknownRetentionPolicy { .. }))
        ));
        client.drop_retention_policy("autogen", "telemetry").unwrap();

        let executed = client.transport().executed.borrow();
        assert_eq!(
            executed[0],
            r#"CREATE RETENTION POLICY "week" ON "telemetry" DURATION 168h REPLICATION 1"#
        );
        assert!(executed[1].starts_with(r#"ALTER RETENTION POLICY "autogen" ON "telemetry""#));
        assert_eq!(executed[2], r#"DROP RETENTION POLICY "autogen" ON "telemetry""#);
    }

    #[test]
    fn test_write_encodes_object() {
        let mut client = client(&["telemetry"]);
        client.use_database("telemetry").unwrap();
        client
            .write(&Cpu {
                host: "a".into(),
                usage: 0.5,
            })
            .unwrap();

        let written = client.transport().written.borrow();
        let (database, rp, points) = &written[0];
        assert_eq!(database, "telemetry");
        assert_eq!(rp, &None);
        assert_eq!(points[0].measurement(), "cpu");
        assert_eq!(points[0].tag("host"), Some("a"));
    }

    #[test]
    fn test_write_checks_database_and_policy() {
        let client = client(&["telemetry"]);
        let point = Point::builder("m").field("v", 1).build().unwrap();

        assert!(matches!(
            client.write_point("nope", &point, None),
            Err(FluxError::Client(ClientError::UnknownDatabase { .. }))
        ));
        assert!(matches!(
            client.write_point("telemetry", &point, Some("week")),
            Err(FluxError::Client(ClientError::UnknownRetentionPolicy { .. }))
        ));
        client.write_point("telemetry", &point, Some("autogen")).unwrap();
        assert_eq!(client.transport().written.borrow().len(), 1);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut client = client(&["telemetry"]);
        client.use_database("telemetry").unwrap();
        client.write_all::<Cpu>(&[]).unwrap();
        client.write_points("nope", &[], None).unwrap();
        assert!(client.transport().written.borrow().is_empty());
    }

    #[test]
    fn test_query_as_and_all_points() {
        let mut transport = FakeTransport::with_databases(&["telemetry"]);
        transport.select = vec![QueryResult::from_series(vec![
            Series::new("cpu", &["time", "host", "usage"])
                .with_row(vec![json!("2023-11-14T22:13:20Z"), json!("a"), json!(0.5)])
                .with_row(vec![json!("2023-11-14T22:13:21Z"), json!("b"), json!(0.25)]),
        ])];
        let client = Client::new(transport).unwrap();

        let rows: Vec<Cpu> = client.query_as("telemetry", "SELECT * FROM cpu").unwrap();
        assert_eq!(
            rows,
            [
                Cpu { host: "a".into(), usage: 0.5 },
                Cpu { host: "b".into(), usage: 0.25 }
            ]
        );
        assert_eq!(client.all_points::<Cpu>("telemetry").unwrap().len(), 2);
        assert_eq!(client.all_points_raw("telemetry", "cpu").unwrap().len(), 2);
        assert!(matches!(
            client.query_one::<Cpu>("telemetry", "SELECT * FROM cpu"),
            Err(FluxError::Decode(DecodeError::MultipleRows { rows: 2 }))
        ));
    }

    #[test]
    fn test_query_unknown_database() {
        let client = client(&["telemetry"]);
        assert!(matches!(
            client.query_as::<Cpu>("nope", "SELECT * FROM cpu"),
            Err(FluxError::Client(ClientError::UnknownDatabase { .. }))
        ));
    }

    #[test]
    fn test_query_no_data_is_empty() {
        let client = client(&["telemetry"]);
        assert!(client.all_points::<Cpu>("telemetry").unwrap().is_empty());
        assert_eq!(client.query_one::<Cpu>("telemetry", "SELECT * FROM cpu").unwrap(), None);
    }
}
