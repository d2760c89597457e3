//! Weighted task definitions and the built-in scenario catalogue.

use serde::Serialize;

use crate::error::{DomainError, DomainResult};
use crate::payload::PayloadKind;
use crate::request::HttpMethod;
use crate::resource::{Resource, TaskTag};

/// Placeholder for an item id in a path template.
pub const ID_PLACEHOLDER: &str = "{id}";
/// Placeholder for a user id in a path template.
pub const USER_ID_PLACEHOLDER: &str = "{user_id}";

/// Where a by-id task gets its id from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Any id seen so far, falling back to the resource default.
    Known,
    /// Only ids created by this run; the task is skipped when none exist.
    Created,
}

/// One weighted request a virtual user may pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskDefinition {
    /// Display name, also the stats key
    pub name: &'static str,
    /// Resource the task targets
    pub resource: Resource,
    /// HTTP method
    pub method: HttpMethod,
    /// Path template relative to the API host
    pub path: &'static str,
    /// Relative selection weight
    pub weight: u32,
    /// Classification for `--tags`
    pub tag: TaskTag,
    /// Request body
    pub payload: PayloadKind,
    /// Source of `{id}`
    pub id_source: IdSource,
    /// Delete the created item straight after a successful create
    pub cleanup: bool,
}

impl TaskDefinition {
    const fn new(
        name: &'static str,
        resource: Resource,
        method: HttpMethod,
        path: &'static str,
        weight: u32,
        tag: TaskTag,
    ) -> Self {
        Self {
            name,
            resource,
            method,
            path,
            weight,
            tag,
            payload: PayloadKind::None,
            id_source: IdSource::Known,
            cleanup: false,
        }
    }

    const fn read(name: &'static str, resource: Resource, path: &'static str, weight: u32) -> Self {
        Self::new(name, resource, HttpMethod::Get, path, weight, TaskTag::Read)
    }

    const fn create(
        name: &'static str,
        resource: Resource,
        path: &'static str,
        weight: u32,
        payload: PayloadKind,
    ) -> Self {
        let mut task = Self::new(name, resource, HttpMethod::Post, path, weight, TaskTag::Create);
        task.payload = payload;
        task
    }

    const fn update(
        name: &'static str,
        resource: Resource,
        path: &'static str,
        weight: u32,
        payload: PayloadKind,
    ) -> Self {
        let mut task = Self::new(name, resource, HttpMethod::Put, path, weight, TaskTag::Update);
        task.payload = payload;
        task
    }

    const fn delete(name: &'static str, resource: Resource, weight: u32) -> Self {
        let mut task = Self::new(name, resource, HttpMethod::Delete, "", weight, TaskTag::Delete);
        task.path = match resource {
            Resource::Users => "/users/{id}",
            Resource::Staff => "/staff/{id}",
            Resource::Teams => "/teams/{id}",
            Resource::Groups => "/groups/{id}",
            Resource::Scores => "/scores/{id}",
            Resource::Scorecards => "/scorecards/{id}",
            Resource::Integrations => "/integrations/{id}",
        };
        task.id_source = IdSource::Created;
        task
    }

    const fn with_cleanup(mut self) -> Self {
        self.cleanup = true;
        self
    }

    /// True if the path template contains a placeholder.
    #[must_use]
    pub fn needs_id(&self) -> bool {
        self.path.contains(ID_PLACEHOLDER) || self.path.contains(USER_ID_PLACEHOLDER)
    }

    /// True for plain collection GETs whose response lists items.
    #[must_use]
    pub fn lists_collection(&self) -> bool {
        self.method == HttpMethod::Get && self.path == self.resource.path()
    }
}

/// Restricts a scenario to tasks matching any of the given tags or resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    tags: Vec<TaskTag>,
    resources: Vec<Resource>,
}

impl TaskFilter {
    /// Parses terms such as `read`, `post` or `users`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownTag` for a term that is neither a tag nor a resource.
    pub fn parse<S: AsRef<str>>(terms: &[S]) -> DomainResult<Self> {
        let mut filter = Self::default();
        for term in terms.iter().map(AsRef::as_ref).filter(|t| !t.trim().is_empty()) {
            if let Ok(tag) = term.parse::<TaskTag>() {
                filter.tags.push(tag);
            } else if let Ok(resource) = term.parse::<Resource>() {
                filter.resources.push(resource);
            } else {
                return Err(DomainError::UnknownTag(term.to_string()));
            }
        }
        Ok(filter)
    }

    /// True if no term was given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.resources.is_empty()
    }

    /// Tags match tags, resources match resources; both kinds must match when both are given.
    #[must_use]
    pub fn matches(&self, task: &TaskDefinition) -> bool {
        let tag_ok = self.tags.is_empty() || self.tags.contains(&task.tag);
        let resource_ok = self.resources.is_empty() || self.resources.contains(&task.resource);
        tag_ok && resource_ok
    }
}

/// A named set of weighted tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scenario {
    /// Lookup name, e.g. `users-get`
    pub name: String,
    /// One-line description
    pub description: String,
    /// Weighted tasks
    pub tasks: Vec<TaskDefinition>,
}

impl Scenario {
    /// Creates a scenario.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<TaskDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tasks,
        }
    }

    /// Keeps only the tasks accepted by `filter`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::EmptyScenario` if nothing with a positive weight is left.
    pub fn filtered(mut self, filter: &TaskFilter) -> DomainResult<Self> {
        self.tasks.retain(|task| filter.matches(task) && task.weight > 0);
        if self.tasks.is_empty() {
            return Err(DomainError::EmptyScenario(self.name));
        }
        Ok(self)
    }

    /// Sum of all task weights.
    #[must_use]
    pub fn total_weight(&self) -> u32 {
        self.tasks.iter().map(|t| t.weight).sum()
    }
}

fn resource_tasks(resource: Resource, method: HttpMethod) -> Vec<TaskDefinition> {
    use PayloadKind as P;
    use Resource as R;
    use TaskDefinition as T;

    match (resource, method) {
        (R::Users, HttpMethod::Get) => vec![
            T::read("Users List", R::Users, "/users", 3),
            T::read("User by ID", R::Users, "/users/{id}", 2),
        ],
        (R::Users, HttpMethod::Post) => vec![
            T::create("Create User", R::Users, "/users", 2, P::User).with_cleanup(),
            T::create("Create User Password", R::Users, "/users/{id}/password", 1, P::Password),
        ],
        (R::Users, HttpMethod::Put) => vec![
            T::update("Update User", R::Users, "/users", 2, P::UserUpdate),
            T::update("Update User Password", R::Users, "/users/{id}/password", 1, P::NewPassword),
        ],
        (R::Users, HttpMethod::Delete) => vec![
            T::create("Create User for Deletion", R::Users, "/users", 1, P::User),
            T::delete("Delete User", R::Users, 1),
        ],

        (R::Teams, HttpMethod::Get) => vec![
            T::read("Teams List", R::Teams, "/teams", 3),
            T::read("Team by ID", R::Teams, "/teams/{id}", 2),
        ],
        (R::Teams, HttpMethod::Post) => vec![
            T::create("Create Team", R::Teams, "/teams", 2, P::Team).with_cleanup(),
            T::create("Create Team with Members", R::Teams, "/teams", 1, P::TeamWithMembers)
                .with_cleanup(),
        ],
        (R::Teams, HttpMethod::Put) => {
            vec![T::update("Update Team", R::Teams, "/teams", 1, P::TeamUpdate)]
        }
        (R::Teams, HttpMethod::Delete) => vec![
            T::create("Create Team for Deletion", R::Teams, "/teams", 1, P::Team),
            T::delete("Delete Team", R::Teams, 1),
        ],

        (R::Staff, HttpMethod::Get) => vec![
            T::read("Staff List", R::Staff, "/staff", 3),
            T::read("Staff by ID", R::Staff, "/staff/{id}", 2),
            T::read("Staff Employees", R::Staff, "/staff/employees", 1),
        ],
        (R::Staff, HttpMethod::Post) => vec![
            T::create("Create Staff", R::Staff, "/staff", 3, P::Staff).with_cleanup(),
            T::create("Create Staff with Position", R::Staff, "/staff", 2, P::StaffWithPosition)
                .with_cleanup(),
        ],
        (R::Staff, HttpMethod::Put) => vec![
            T::update("Update Staff", R::Staff, "/staff/{id}", 3, P::StaffUpdate),
            T::update("Update Staff Position", R::Staff, "/staff/{id}", 2, P::StaffPosition),
        ],
        (R::Staff, HttpMethod::Delete) => vec![
            T::create("Create Staff for Deletion", R::Staff, "/staff", 1, P::Staff),
            T::delete("Delete Staff", R::Staff, 1),
        ],

        (R::Groups, HttpMethod::Get) => vec![
            T::read("Groups List", R::Groups, "/groups", 3),
            T::read("Group by ID", R::Groups, "/groups/{id}", 2),
        ],
        (R::Groups, HttpMethod::Post) => vec![
            T::create("Create Group", R::Groups, "/groups", 3, P::Group).with_cleanup(),
            T::create("Create Group with Members", R::Groups, "/groups", 2, P::GroupWithMembers)
                .with_cleanup(),
        ],
        (R::Groups, HttpMethod::Put) => vec![
            T::update("Update Group", R::Groups, "/groups/{id}", 3, P::GroupUpdate),
            T::update("Update Group Members", R::Groups, "/groups/{id}/members", 2, P::GroupMembers),
        ],
        (R::Groups, HttpMethod::Delete) => vec![
            T::create("Create Group for Deletion", R::Groups, "/groups", 1, P::Group),
            T::delete("Delete Group", R::Groups, 1),
        ],

        (R::Scores, HttpMethod::Get) => vec![
            T::read("Scores List", R::Scores, "/scores", 3),
            T::read("Scores by User", R::Scores, "/scores?user_id={user_id}", 2),
            T::read("Scores Reviews", R::Scores, "/scores/reviews", 1),
            T::read("Score by ID", R::Scores, "/scores/{id}", 1),
        ],

        (R::Scorecards, HttpMethod::Get) => vec![
            T::read("Scorecards List", R::Scorecards, "/scorecards", 3),
            T::read("Scorecard Categories", R::Scorecards, "/scorecards/categories", 2),
            T::read("Scorecard by ID", R::Scorecards, "/scorecards/{id}", 1),
            T::read("Scorecard Category by ID", R::Scorecards, "/scorecards/categories/1", 1),
        ],

        (R::Integrations, HttpMethod::Get) => vec![
            T::read("Integrations List", R::Integrations, "/integrations", 3),
            T::read("Integration by ID", R::Integrations, "/integrations/{id}", 2),
            T::read("Integration Cases", R::Integrations, "/integrations/{id}/cases", 1),
        ],
        (R::Integrations, HttpMethod::Post) => vec![
            T::create("Create Integration", R::Integrations, "/integrations", 3, P::Integration)
                .with_cleanup(),
            T::create(
                "Create Webhook Integration",
                R::Integrations,
                "/integrations",
                2,
                P::WebhookIntegration,
            )
            .with_cleanup(),
        ],
        (R::Integrations, HttpMethod::Put) => vec![
            T::update(
                "Update Integration",
                R::Integrations,
                "/integrations/{id}",
                3,
                P::IntegrationUpdate,
            ),
            T::update(
                "Update Integration Status",
                R::Integrations,
                "/integrations/{id}/status",
                2,
                P::IntegrationStatus,
            ),
        ],
        (R::Integrations, HttpMethod::Delete) => vec![
            T::create(
                "Create Integration for Deletion",
                R::Integrations,
                "/integrations",
                1,
                P::Integration,
            ),
            T::delete("Delete Integration", R::Integrations, 1),
        ],

        _ => Vec::new(),
    }
}

fn smoke() -> Scenario {
    use Resource as R;
    use TaskDefinition as T;

    Scenario::new(
        "smoke",
        "Read-only mix across every resource, weighted towards scorecard categories",
        vec![
            T::read("Scorecard Categories", R::Scorecards, "/scorecards/categories", 3),
            T::read("Users List", R::Users, "/users", 2),
            T::read("Teams List", R::Teams, "/teams", 2),
            T::read("Staff List", R::Staff, "/staff", 1),
            T::read("Groups List", R::Groups, "/groups", 1),
            T::read("Scores List", R::Scores, "/scores", 1),
            T::read("Scorecards List", R::Scorecards, "/scorecards", 1),
        ],
    )
}

/// Every built-in scenario: `smoke`, `crud`, one per resource and one per
/// resource/method pair (e.g. `users-get`, `teams-post`).
#[must_use]
pub fn catalogue() -> Vec<Scenario> {
    let methods = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Delete,
    ];

    let mut scenarios = vec![smoke()];
    let mut everything = Vec::new();

    for &resource in Resource::all() {
        let mut per_resource = Vec::new();
        for method in methods {
            let tasks = resource_tasks(resource, method);
            if tasks.is_empty() {
                continue;
            }
            scenarios.push(Scenario::new(
                format!("{resource}-{}", method.as_str().to_lowercase()),
                format!("{method} operations on /{resource}"),
                tasks.clone(),
            ));
            per_resource.extend(tasks);
        }
        everything.extend(per_resource.iter().copied());
        scenarios.push(Scenario::new(
            resource.as_str(),
            format!("All operations on /{resource}"),
            per_resource,
        ));
    }

    scenarios.push(Scenario::new(
        "crud",
        "Every task of every resource",
        everything,
    ));
    scenarios
}

/// Looks up a built-in scenario by name, ignoring case.
///
/// # Errors
///
/// Returns `DomainError::UnknownScenario` if no scenario has that name.
pub fn find_scenario(name: &str) -> DomainResult<Scenario> {
    catalogue()
        .into_iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| DomainError::UnknownScenario(name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke_weights() {
        let smoke = find_scenario("SMOKE").unwrap();
        assert_eq!(smoke.tasks.len(), 7);
        assert_eq!(smoke.total_weight(), 11);
        assert_eq!(smoke.tasks[0].path, "/scorecards/categories");
        assert!(smoke.tasks.iter().all(|t| t.tag == TaskTag::Read));
    }

    #[test]
    fn test_per_method_scenarios_exist() {
        for name in ["users-get", "users-post", "teams-put", "groups-delete", "scores-get"] {
            assert!(find_scenario(name).is_ok(), "missing {name}");
        }
        assert!(find_scenario("scores-post").is_err());
        assert!(find_scenario("scorecards-delete").is_err());
    }

    #[test]
    fn test_read_only_resources_have_only_reads() {
        let crud = find_scenario("crud").unwrap();
        assert!(
            crud.tasks
                .iter()
                .filter(|t| t.resource.is_read_only())
                .all(|t| t.method == HttpMethod::Get)
        );
    }

    #[test]
    fn test_delete_tasks_only_use_created_ids() {
        let crud = find_scenario("crud").unwrap();
        for task in crud.tasks.iter().filter(|t| t.method == HttpMethod::Delete) {
            assert_eq!(task.id_source, IdSource::Created, "{}", task.name);
            assert!(task.needs_id());
        }
    }

    #[test]
    fn test_filter_by_tag_and_resource() {
        let filter = TaskFilter::parse(&["read", "teams"]).unwrap();
        let scenario = find_scenario("crud").unwrap().filtered(&filter).unwrap();
        assert!(!scenario.tasks.is_empty());
        assert!(
            scenario
                .tasks
                .iter()
                .all(|t| t.tag == TaskTag::Read && t.resource == Resource::Teams)
        );
    }

    #[test]
    fn test_filter_leaving_nothing_is_an_error() {
        let filter = TaskFilter::parse(&["delete"]).unwrap();
        let err = find_scenario("smoke").unwrap().filtered(&filter).unwrap_err();
        assert_eq!(err, DomainError::EmptyScenario("smoke".to_string()));
    }

    #[test]
    fn test_filter_rejects_unknown_terms() {
        assert!(TaskFilter::parse(&["bogus"]).is_err());
        assert!(TaskFilter::parse::<&str>(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_lists_collection() {
        let users = find_scenario("users-get").unwrap();
        assert!(users.tasks[0].lists_collection());
        assert!(!users.tasks[1].lists_collection());
    }
}
