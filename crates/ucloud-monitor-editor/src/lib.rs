/*! The host-agnostic core of the UCloud Monitor query editor.

Grafana renders the editor, but everything it decides lives here:

- [`variables`] resolves dashboard template variables inside query fields.
- [`params`] builds the flat parameter objects sent to the backend's
  `generic_api` resource for each lookup.
- [`options`] turns resource responses into selectable options, failing soft
  when the backend is unreachable, and resolves template variable queries.
- [`form`] holds the query editor's form state: which selectors are stale,
  which loads are still current, and what is committed to the host.
- [`config`] holds the datasource settings page state, including the
  write-only secrets.
- [`http`] calls datasource resources through Grafana's HTTP API.

Nothing here talks to UCloud directly. All lookups go through the backend
plugin, which holds the credentials.
*/
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod form;
pub mod http;
pub mod options;
pub mod params;
pub mod query;
pub mod variables;

pub use config::{DataSourceConfig, SecretKey};
pub use error::{FetchError, VariableQueryError};
pub use form::{EditorHost, Field, QueryEditor, Selector};
pub use http::GrafanaResourceClient;
pub use options::{load_options, metric_find_query, ResourceFetcher, SelectOption};
pub use params::{build_params, Action, ParameterObject, GENERIC_API};
pub use query::{Query, ResourceType};
pub use variables::{substitute, Variable, VariableTable};
