/*! Form state for the query editor.

The editor shows five selector fields whose options come from the backend
(project, region, resource type, metric name and resource id) and a handful of
free-text condition fields. Each selector declares which fields its options
depend on; changing one of those fields marks the selector stale, and the next
[`QueryEditor::refresh`] reloads every stale selector in one pass.

Loads are tagged with a per-selector sequence number. A response is only
accepted if it belongs to the most recent load issued for its selector, so a
slow response for an outdated query can never overwrite fresher options.

Every committed change is handed straight to the host together with a request
to run the query; there is no separate "apply" step.
*/
use std::{collections::BTreeSet, fmt};

use futures_util::future::join_all;
use tracing::debug;

use crate::{
    options::{load_options_with_params, ResourceFetcher, SelectOption},
    params::{build_params, Action, ParameterObject},
    query::{Query, ResourceType},
    variables::VariableTable,
};

/// An editable field of the query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// `projectId`
    ProjectId,
    /// `region`
    Region,
    /// `resourceType`
    ResourceType,
    /// `metricName`
    MetricName,
    /// `resourceId`
    ResourceId,
    /// `tag`
    Tag,
    /// `limit`
    Limit,
    /// `offset`
    Offset,
    /// `ulbId`, only shown for `ulb-vserver`.
    UlbId,
    /// `classType`, only shown for `udb`.
    ClassType,
}

impl Field {
    /// The label shown next to the field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ProjectId => "ProjectId",
            Self::Region => "Region",
            Self::ResourceType => "ResourceType",
            Self::MetricName => "MetricName",
            Self::ResourceId => "ResourceId",
            Self::Tag => "Tag",
            Self::Limit => "Limit",
            Self::Offset => "Offset",
            Self::UlbId => "ULBId",
            Self::ClassType => "ClassType",
        }
    }

    /// Read this field from `query`; unset optional fields read as `""`.
    pub fn get<'a>(&self, query: &'a Query) -> &'a str {
        match self {
            Self::ProjectId => query.project_id.as_deref().unwrap_or_default(),
            Self::Region => &query.region,
            Self::ResourceType => &query.resource_type,
            Self::MetricName => &query.metric_name,
            Self::ResourceId => &query.resource_id,
            Self::Tag => &query.tag,
            Self::Limit => &query.limit,
            Self::Offset => &query.offset,
            Self::UlbId => query.ulb_id.as_deref().unwrap_or_default(),
            Self::ClassType => query.class_type.as_deref().unwrap_or_default(),
        }
    }

    /// Write `value` into this field of `query`; empty values clear optional fields.
    pub fn set(&self, query: &mut Query, value: String) {
        match self {
            Self::ProjectId => query.project_id = non_empty(value),
            Self::UlbId => query.ulb_id = non_empty(value),
            Self::ClassType => query.class_type = non_empty(value),
            Self::Region => query.region = value,
            Self::ResourceType => query.resource_type = value,
            Self::MetricName => query.metric_name = value,
            Self::ResourceId => query.resource_id = value,
            Self::Tag => query.tag = value,
            Self::Limit => query.limit = value,
            Self::Offset => query.offset = value,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A field whose options are loaded from the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Selector {
    /// Project selector.
    ProjectId,
    /// Region selector.
    Region,
    /// Resource type selector.
    ResourceType,
    /// Metric name selector; depends on the resource type.
    MetricName,
    /// Resource id selector; depends on every lookup condition.
    ResourceId,
}

impl Selector {
    /// Every selector, in display order.
    pub const ALL: [Selector; 5] = [
        Self::ProjectId,
        Self::Region,
        Self::ResourceType,
        Self::MetricName,
        Self::ResourceId,
    ];

    /// The lookup that produces this selector's options.
    pub fn action(&self) -> Action {
        match self {
            Self::ProjectId => Action::GetProjectId,
            Self::Region => Action::GetRegion,
            Self::ResourceType => Action::GetResourceType,
            Self::MetricName => Action::GetMetricName,
            Self::ResourceId => Action::GetResourceId,
        }
    }

    /// The query field this selector edits.
    pub fn field(&self) -> Field {
        match self {
            Self::ProjectId => Field::ProjectId,
            Self::Region => Field::Region,
            Self::ResourceType => Field::ResourceType,
            Self::MetricName => Field::MetricName,
            Self::ResourceId => Field::ResourceId,
        }
    }

    /// The fields whose changes invalidate this selector's options.
    pub fn dependencies(&self) -> &'static [Field] {
        match self {
            Self::ProjectId | Self::Region | Self::ResourceType => &[],
            Self::MetricName => &[Field::ResourceType],
            Self::ResourceId => &[
                Field::ProjectId,
                Field::Region,
                Field::ResourceType,
                Field::Tag,
                Field::Limit,
                Field::Offset,
                Field::UlbId,
                Field::ClassType,
            ],
        }
    }

    /// The fields that must be set before this selector's options can be loaded.
    pub fn required(&self) -> &'static [Field] {
        match self {
            Self::ProjectId | Self::Region | Self::ResourceType => &[],
            Self::MetricName | Self::ResourceId => &[Field::ResourceType],
        }
    }

    /// Whether `query` has every field this selector requires.
    pub fn is_ready(&self, query: &Query) -> bool {
        self.required().iter().all(|f| !f.get(query).is_empty())
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Loading state of a selector's options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadStatus {
    /// No load has been issued yet.
    #[default]
    Idle,
    /// A load is in flight.
    Loading,
    /// The most recent load has completed; failures land here with no options.
    Loaded,
}

/// Per-selector state: displayed value and most recently loaded options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectorState {
    /// The displayed value.
    pub value: String,
    /// The options from the most recent accepted load.
    pub options: Vec<SelectOption>,
    /// Where the selector is in its load cycle.
    pub status: LoadStatus,
    latest_sequence: u64,
}

/// A handle for an issued load.
///
/// Pass it back to [`QueryEditor::complete_load`] together with the options once
/// the parameters have been sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    /// The selector being loaded.
    pub selector: Selector,
    /// The sequence number of this load for `selector`.
    pub sequence: u64,
    /// The parameters to send, built from the query at issue time.
    pub params: ParameterObject,
}

/// The host side of the editor: persists committed queries and executes them.
pub trait EditorHost {
    /// Persist the updated query.
    fn on_change(&mut self, query: &Query);
    /// Execute the current query.
    fn on_run_query(&mut self);
}

/// The query editor's state holder.
#[derive(Debug)]
pub struct QueryEditor<H> {
    query: Query,
    host: H,
    selectors: [SelectorState; 5],
    stale: BTreeSet<Selector>,
}

impl<H: EditorHost> QueryEditor<H> {
    /// Create an editor for `query`. Every selector starts out stale.
    pub fn new(query: Query, host: H) -> Self {
        let selectors = Selector::ALL.map(|s| SelectorState {
            value: s.field().get(&query).to_string(),
            ..Default::default()
        });
        Self {
            query,
            host,
            selectors,
            stale: Selector::ALL.into_iter().collect(),
        }
    }

    /// The query being edited.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The state of `selector`.
    pub fn selector(&self, selector: Selector) -> &SelectorState {
        &self.selectors[selector.index()]
    }

    /// Selectors waiting to be reloaded.
    pub fn stale_selectors(&self) -> Vec<Selector> {
        self.stale.iter().copied().collect()
    }

    /// The condition fields currently shown, in display order.
    ///
    /// `ULBId` is only shown for `ulb-vserver` and `ClassType` only for `udb`.
    pub fn visible_fields(&self) -> Vec<Field> {
        let mut fields = Vec::with_capacity(5);
        match self.query.known_resource_type() {
            Some(ResourceType::UlbVServer) => fields.push(Field::UlbId),
            Some(ResourceType::Udb) => fields.push(Field::ClassType),
            _ => {}
        }
        fields.extend([Field::Offset, Field::Limit, Field::Tag]);
        fields
    }

    /// Commit a new value for `field`.
    ///
    /// The host is told to persist and run the updated query. Returns the
    /// selectors that became stale; setting a field to its current value is a
    /// no-op and returns nothing.
    pub fn set_field(&mut self, field: Field, value: impl Into<String>) -> Vec<Selector> {
        let value = value.into();
        if field.get(&self.query) == value {
            return Vec::new();
        }
        field.set(&mut self.query, value);
        if let Some(selector) = Selector::ALL.into_iter().find(|s| s.field() == field) {
            self.selectors[selector.index()].value = field.get(&self.query).to_string();
        }
        self.host.on_change(&self.query);
        self.host.on_run_query();

        let invalidated: Vec<Selector> = Selector::ALL
            .into_iter()
            .filter(|s| s.dependencies().contains(&field))
            .collect();
        self.stale.extend(invalidated.iter().copied());
        debug!(%field, ?invalidated, "field changed");
        invalidated
    }

    /// The user picked `value` in `selector`.
    pub fn select(&mut self, selector: Selector, value: impl Into<String>) -> Vec<Selector> {
        self.set_field(selector.field(), value)
    }

    /// Issue a new load for `selector` using the current query.
    ///
    /// Any load previously issued for the selector is superseded.
    pub fn begin_load(&mut self, selector: Selector, table: &VariableTable) -> LoadTicket {
        let state = &mut self.selectors[selector.index()];
        state.latest_sequence += 1;
        state.status = LoadStatus::Loading;
        self.stale.remove(&selector);
        LoadTicket {
            selector,
            sequence: state.latest_sequence,
            params: build_params(selector.action(), &self.query, table),
        }
    }

    /// Deliver the options for an issued load.
    ///
    /// Returns `false`, leaving the state untouched, if a newer load has since
    /// been issued for the same selector.
    pub fn complete_load(&mut self, ticket: LoadTicket, options: Vec<SelectOption>) -> bool {
        let state = &mut self.selectors[ticket.selector.index()];
        if ticket.sequence != state.latest_sequence {
            debug!(
                selector = ?ticket.selector,
                sequence = ticket.sequence,
                latest = state.latest_sequence,
                "discarding stale options"
            );
            return false;
        }
        state.options = options;
        state.status = LoadStatus::Loaded;
        true
    }

    /// Reload every stale selector, returning the selectors that were refreshed.
    ///
    /// Selectors missing a [required](Selector::required) field stay stale and
    /// are not loaded.
    pub async fn refresh<F>(&mut self, fetcher: &F, table: &VariableTable) -> Vec<Selector>
    where
        F: ResourceFetcher + ?Sized,
    {
        let ready: Vec<Selector> = self
            .stale
            .iter()
            .copied()
            .filter(|s| s.is_ready(&self.query))
            .collect();
        let tickets: Vec<LoadTicket> = ready
            .into_iter()
            .map(|s| self.begin_load(s, table))
            .collect();
        let results = join_all(
            tickets
                .iter()
                .map(|ticket| load_options_with_params(fetcher, &ticket.params)),
        )
        .await;
        tickets
            .into_iter()
            .zip(results)
            .filter_map(|(ticket, options)| {
                let selector = ticket.selector;
                self.complete_load(ticket, options).then_some(selector)
            })
            .collect()
    }

    /// The query with template variables resolved, as sent for execution.
    pub fn committed_query(&self, table: &VariableTable) -> Query {
        self.query.apply_template_variables(table)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{options::test::MockFetcher, params::keys};

    #[derive(Debug, Default)]
    struct RecordingHost {
        changes: Vec<Query>,
        runs: usize,
    }

    impl EditorHost for RecordingHost {
        fn on_change(&mut self, query: &Query) {
            self.changes.push(query.clone());
        }

        fn on_run_query(&mut self) {
            self.runs += 1;
        }
    }

    fn editor() -> QueryEditor<RecordingHost> {
        QueryEditor::new(Query::default(), RecordingHost::default())
    }

    #[test]
    fn every_selector_starts_stale() {
        assert_eq!(editor().stale_selectors(), Selector::ALL.to_vec());
    }

    #[test]
    fn commit_persists_and_runs() {
        let mut editor = editor();
        editor.select(Selector::Region, "cn-bj2");
        assert_eq!(editor.query().region, "cn-bj2");
        assert_eq!(editor.selector(Selector::Region).value, "cn-bj2");
        assert_eq!(editor.host().changes.len(), 1);
        assert_eq!(editor.host().changes[0].region, "cn-bj2");
        assert_eq!(editor.host().runs, 1);
    }

    #[test]
    fn unchanged_value_is_a_no_op() {
        let mut editor = editor();
        editor.set_field(Field::Tag, "web");
        assert_eq!(editor.set_field(Field::Tag, "web"), vec![]);
        assert_eq!(editor.host().runs, 1);
    }

    #[test]
    fn dependencies_decide_staleness() {
        let mut editor = editor();
        assert_eq!(
            editor.set_field(Field::ResourceType, "uhost"),
            vec![Selector::MetricName, Selector::ResourceId]
        );
        assert_eq!(editor.set_field(Field::Tag, "db"), vec![Selector::ResourceId]);
        assert_eq!(editor.set_field(Field::MetricName, "CPU"), vec![]);
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut editor = editor();
        let table = VariableTable::default();
        editor.set_field(Field::ResourceType, "uhost");
        let first = editor.begin_load(Selector::MetricName, &table);
        editor.set_field(Field::ResourceType, "eip");
        let second = editor.begin_load(Selector::MetricName, &table);
        assert_eq!(second.params.get(keys::RESOURCE_TYPE), Some("eip"));

        assert!(editor.complete_load(second, vec![SelectOption::new("EIPBandwidth")]));
        assert!(!editor.complete_load(first, vec![SelectOption::new("CPUUtilization")]));

        let state = editor.selector(Selector::MetricName);
        assert_eq!(state.options, vec![SelectOption::new("EIPBandwidth")]);
        assert_eq!(state.status, LoadStatus::Loaded);
    }

    #[test]
    fn load_status_transitions() {
        let mut editor = editor();
        let table = VariableTable::default();
        assert_eq!(editor.selector(Selector::Region).status, LoadStatus::Idle);
        let ticket = editor.begin_load(Selector::Region, &table);
        assert_eq!(editor.selector(Selector::Region).status, LoadStatus::Loading);
        assert!(!editor.stale_selectors().contains(&Selector::Region));
        editor.complete_load(ticket, vec![]);
        assert_eq!(editor.selector(Selector::Region).status, LoadStatus::Loaded);
    }

    #[tokio::test]
    async fn refresh_reloads_only_stale_selectors() {
        let mut editor = editor();
        let table = VariableTable::default();
        let fetcher = MockFetcher::returning(json!(["a"]));
        let refreshed = editor.refresh(&fetcher, &table).await;
        assert_eq!(
            refreshed,
            vec![Selector::ProjectId, Selector::Region, Selector::ResourceType]
        );
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(
            editor.stale_selectors(),
            vec![Selector::MetricName, Selector::ResourceId]
        );

        fetcher.set_response(json!(["CPUUtilization", "MemUsage"]));
        editor.set_field(Field::ResourceType, "uhost");
        let refreshed = editor.refresh(&fetcher, &table).await;
        assert_eq!(refreshed, vec![Selector::MetricName, Selector::ResourceId]);
        assert_eq!(fetcher.call_count(), 5);
        assert!(editor.stale_selectors().is_empty());
        assert_eq!(
            editor.selector(Selector::MetricName).options,
            vec![SelectOption::new("CPUUtilization"), SelectOption::new("MemUsage")]
        );
        assert_eq!(editor.selector(Selector::Region).options, vec![SelectOption::new("a")]);
    }

    #[tokio::test]
    async fn failed_refresh_loads_no_options() {
        let mut editor = editor();
        let fetcher = MockFetcher::failing();
        editor.set_field(Field::ResourceType, "uhost");
        editor.refresh(&fetcher, &VariableTable::default()).await;
        for selector in Selector::ALL {
            let state = editor.selector(selector);
            assert_eq!(state.status, LoadStatus::Loaded);
            assert!(state.options.is_empty());
        }
    }

    #[tokio::test]
    async fn dependent_selectors_wait_for_resource_type() {
        let mut editor = editor();
        let table = VariableTable::default();
        let fetcher = MockFetcher::returning(json!(["x"]));
        editor.refresh(&fetcher, &table).await;
        let actions: Vec<_> = fetcher
            .recorded_calls()
            .iter()
            .map(|(_, params)| params.get(keys::ACTION).unwrap_or_default().to_string())
            .collect();
        assert_eq!(actions, vec!["GetProjectId", "GetRegion", "GetResourceType"]);
        for selector in [Selector::MetricName, Selector::ResourceId] {
            let state = editor.selector(selector);
            assert_eq!(state.status, LoadStatus::Idle);
            assert!(state.options.is_empty());
        }

        // Still nothing to load for them.
        editor.set_field(Field::Region, "cn-bj2");
        editor.refresh(&fetcher, &table).await;
        assert_eq!(fetcher.call_count(), 3);

        editor.set_field(Field::ResourceType, "uhost");
        editor.refresh(&fetcher, &table).await;
        let calls = fetcher.recorded_calls();
        assert_eq!(calls.len(), 5);
        assert!(calls[3..]
            .iter()
            .all(|(_, params)| params.get(keys::RESOURCE_TYPE) == Some("uhost")));
    }

    #[test]
    fn selector_readiness() {
        let query = Query::default();
        assert!(Selector::Region.is_ready(&query));
        assert!(!Selector::MetricName.is_ready(&query));
        let query = Query {
            resource_type: "$type".to_string(),
            ..Default::default()
        };
        assert!(Selector::ResourceId.is_ready(&query));
    }

    #[test]
    fn switching_resource_type_swaps_condition_fields() {
        let mut editor = editor();
        let table = VariableTable::default();
        editor.set_field(Field::ResourceType, "ulb-vserver");
        editor.set_field(Field::UlbId, "ulb-1");
        editor.set_field(Field::ClassType, "sql");
        assert_eq!(
            editor.visible_fields(),
            vec![Field::UlbId, Field::Offset, Field::Limit, Field::Tag]
        );

        editor.set_field(Field::ResourceType, "udb");
        assert_eq!(
            editor.visible_fields(),
            vec![Field::ClassType, Field::Offset, Field::Limit, Field::Tag]
        );
        let ticket = editor.begin_load(Selector::ResourceId, &table);
        assert_eq!(ticket.params.get(keys::ULB_ID), None);
        assert_eq!(ticket.params.get(keys::CLASS_TYPE), Some("sql"));
    }

    #[test]
    fn clearing_optional_field_unsets_it() {
        let mut editor = editor();
        editor.set_field(Field::ProjectId, "org-1");
        assert_eq!(editor.query().project_id.as_deref(), Some("org-1"));
        editor.set_field(Field::ProjectId, "");
        assert_eq!(editor.query().project_id, None);
    }
}
