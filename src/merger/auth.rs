//! Identity pools, tenants and directories folded into one identity provider, one realm each

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{MappingResult, Service, Stack, StackType};
use crate::taxonomy::{Category, ResourceType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

pub const REALMS_DIR: &str = "keycloak/realms";
pub const MIGRATE_SCRIPT: &str = "scripts/migrate-users.sh";

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/*";
const DEFAULT_WEB_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_PASSWORD_POLICY: &str = "length(8)";

pub struct AuthMerger;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    pub client_id: String,
    pub enabled: bool,
    pub public_client: bool,
    pub standard_flow_enabled: bool,
    pub service_accounts_enabled: bool,
    pub redirect_uris: Vec<String>,
    pub web_origins: Vec<String>,
    pub attributes: BTreeMap<String, String>,
}

impl ClientRepresentation {
    /// Public PKCE client for local development.
    pub fn default_for(realm: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("pkce.code.challenge.method".to_string(), "S256".to_string());
        Self {
            client_id: format!("{}-app", realm),
            enabled: true,
            public_client: true,
            standard_flow_enabled: true,
            service_accounts_enabled: false,
            redirect_uris: vec![DEFAULT_REDIRECT_URI.to_string()],
            web_origins: vec![DEFAULT_WEB_ORIGIN.to_string()],
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealmRepresentation {
    pub realm: String,
    pub enabled: bool,
    pub registration_allowed: bool,
    pub login_with_email_allowed: bool,
    pub password_policy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_policy_type: Option<String>,
    pub clients: Vec<ClientRepresentation>,
}

/// Translates a source password policy into the identity provider's policy string.
///
/// Accepts an object attribute `password_policy` with `minimum_length`, `require_uppercase`,
/// `require_lowercase`, `require_numbers` and `require_symbols`.
pub fn password_policy(result: &MappingResult) -> String {
    let Some(Value::Object(policy)) = result.attribute("password_policy") else {
        return DEFAULT_PASSWORD_POLICY.to_string();
    };

    let min_length = policy
        .get("minimum_length")
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(8);
    let flag = |key: &str| policy.get(key).and_then(Value::as_bool).unwrap_or(false);

    let mut parts = vec![format!("length({})", min_length)];
    if flag("require_uppercase") {
        parts.push("upperCase(1)".to_string());
    }
    if flag("require_lowercase") {
        parts.push("lowerCase(1)".to_string());
    }
    if flag("require_numbers") {
        parts.push("digits(1)".to_string());
    }
    if flag("require_symbols") {
        parts.push("specialChars(1)".to_string());
    }
    parts.join(" and ")
}

fn client_from(result: &MappingResult) -> ClientRepresentation {
    let name = common::normalize_name(&result.source_name);
    let mut redirect_uris = result.attribute_list("callback_urls");
    redirect_uris.sort();
    redirect_uris.dedup();
    let flows = result.attribute_list("allowed_oauth_flows");
    let confidential = result.attribute_bool("generate_secret").unwrap_or(false);

    let mut attributes = BTreeMap::new();
    if !confidential {
        attributes.insert("pkce.code.challenge.method".to_string(), "S256".to_string());
    }
    let standard_flow = redirect_uris.is_empty() || flows.iter().any(|f| f == "code");
    if redirect_uris.is_empty() {
        redirect_uris.push(DEFAULT_REDIRECT_URI.to_string());
    }

    ClientRepresentation {
        client_id: name,
        enabled: true,
        public_client: !confidential,
        standard_flow_enabled: standard_flow,
        service_accounts_enabled: confidential && flows.iter().any(|f| f == "client_credentials"),
        redirect_uris,
        web_origins: vec!["+".to_string()],
        attributes,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Realm,
    Client,
    Federation,
}

fn role_of(result: &MappingResult) -> Role {
    match result.resource_type() {
        Some(ResourceType::AwsCognitoUserPoolClient) => Role::Client,
        Some(ResourceType::AwsCognitoIdentityPool) => Role::Federation,
        _ if result.attribute_str("user_pool_id").is_some() => Role::Client,
        _ => Role::Realm,
    }
}

/// Whether `result` is the pool a client's `user_pool_id` refers to.
fn is_pool(result: &MappingResult, pool_ref: &str) -> bool {
    result.source_id.as_deref() == Some(pool_ref) || result.source_name == pool_ref
}

fn realm_from(result: &MappingResult, name: String, stack: &mut Stack) -> RealmRepresentation {
    let mfa = result
        .attribute_str("mfa_configuration")
        .map(|m| !m.eq_ignore_ascii_case("off"))
        .unwrap_or(false);
    if mfa {
        stack.add_manual_step(format!(
            "Enrol users of realm {} in OTP; source multi-factor devices cannot be migrated",
            name
        ));
    }
    RealmRepresentation {
        realm: name,
        enabled: true,
        registration_allowed: !result.attribute_bool("admin_create_user_only").unwrap_or(false),
        login_with_email_allowed: true,
        password_policy: password_policy(result),
        otp_policy_type: mfa.then(|| "totp".to_string()),
        clients: Vec::new(),
    }
}

/// One realm per identity pool, clients attached by pool reference, in input order.
pub fn build_realms(results: &[MappingResult], stack: &mut Stack) -> Vec<RealmRepresentation> {
    let mut names = NameAllocator::new();
    names.reserve("master");

    let mut realms: Vec<RealmRepresentation> = Vec::new();
    let mut realm_sources: Vec<&MappingResult> = Vec::new();
    for result in results.iter().filter(|r| role_of(r) == Role::Realm) {
        let name = names.allocate(&common::normalize_name(&result.source_name));
        stack.set_metadata(format!("realm.{}", result.source_name), name.clone());
        realms.push(realm_from(result, name, stack));
        realm_sources.push(result);
    }

    for result in results {
        match role_of(result) {
            Role::Realm => {}
            Role::Federation => stack.add_warning(format!(
                "{}: federated identity pool has no direct equivalent; configure identity brokering per provider",
                result.source_name
            )),
            Role::Client => {
                let pool_ref = result.attribute_str("user_pool_id").unwrap_or_default();
                let target = realm_sources.iter().position(|r| is_pool(r, pool_ref));
                let index = match target {
                    Some(index) => index,
                    None if !realms.is_empty() => {
                        stack.add_warning(format!(
                            "{}: user pool '{}' not found; client attached to realm {}",
                            result.source_name, pool_ref, realms[0].realm
                        ));
                        0
                    }
                    None => {
                        let name = names.allocate(&common::normalize_name(&result.source_name));
                        stack.add_warning(format!(
                            "{}: no identity pool in input; realm {} created for the client",
                            result.source_name, name
                        ));
                        realms.push(RealmRepresentation {
                            realm: name,
                            enabled: true,
                            registration_allowed: true,
                            login_with_email_allowed: true,
                            password_policy: DEFAULT_PASSWORD_POLICY.to_string(),
                            otp_policy_type: None,
                            clients: Vec::new(),
                        });
                        realm_sources.push(result);
                        realms.len() - 1
                    }
                };
                realms[index].clients.push(client_from(result));
            }
        }
    }

    if realms.is_empty() {
        let name = names.allocate("default");
        realms.push(RealmRepresentation {
            realm: name,
            enabled: true,
            registration_allowed: false,
            login_with_email_allowed: true,
            password_policy: DEFAULT_PASSWORD_POLICY.to_string(),
            otp_policy_type: None,
            clients: Vec::new(),
        });
    }

    for realm in &mut realms {
        if realm.clients.is_empty() {
            realm.clients.push(ClientRepresentation::default_for(&realm.realm));
        }
    }
    realms
}

fn migration_script(realms: &[RealmRepresentation]) -> String {
    let mut script = common::script_header("Imports users into a realm; safe to re-run");
    script.push_str("REALM=\"${1:?usage: migrate-users.sh <realm> <users.csv>}\"\n");
    script.push_str("USERS_FILE=\"${2:?usage: migrate-users.sh <realm> <users.csv>}\"\n");
    script.push_str("KEYCLOAK_URL=\"${KEYCLOAK_URL:-http://localhost:8180}\"\n\n");

    script.push_str("case \"$REALM\" in\n");
    let known: Vec<&str> = realms.iter().map(|r| r.realm.as_str()).collect();
    script.push_str(&format!("  {}) ;;\n", known.join("|")));
    script.push_str("  *) echo \"unknown realm: $REALM\" >&2; exit 1 ;;\nesac\n\n");

    script.push_str(
        "kcadm.sh config credentials --server \"$KEYCLOAK_URL\" --realm master \\\n  --user \"${KEYCLOAK_ADMIN:-admin}\" --password \"${KEYCLOAK_ADMIN_PASSWORD:?}\"\n\n",
    );
    script.push_str("while IFS=, read -r username email; do\n");
    script.push_str("  [ -z \"$username\" ] && continue\n");
    script.push_str("  if kcadm.sh get users -r \"$REALM\" -q exact=true -q username=\"$username\" | grep -q '\"id\"'; then\n");
    script.push_str("    echo \"exists: $username\"\n    continue\n  fi\n");
    script.push_str("  kcadm.sh create users -r \"$REALM\" -s username=\"$username\" -s email=\"$email\" \\\n");
    script.push_str("    -s enabled=true -s 'requiredActions=[\"UPDATE_PASSWORD\"]'\n");
    script.push_str("done < \"$USERS_FILE\"\n");
    script
}

#[async_trait]
impl Merger for AuthMerger {
    fn stack_type(&self) -> StackType {
        StackType::Auth
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| t.category() == Category::Identity,
            &["cognito", "identity", "auth", "aadb2c", "directory", "userpool"],
        )
    }

    async fn merge(
        &self,
        ctx: &MergeContext,
        results: &[MappingResult],
        opts: &MergeOptions,
    ) -> Result<Stack, MergeError> {
        ctx.check()?;
        if results.is_empty() {
            return Err(MergeError::NoMatchingResources {
                stack_type: StackType::Auth,
            });
        }

        let mut stack = common::new_stack(StackType::Auth, results, opts);
        let realms = build_realms(results, &mut stack);
        stack.description = format!("Identity provider with {} realms", realms.len());
        debug!(realms = realms.len(), "Built identity realms");

        for realm in &realms {
            let path = format!("{}/{}.json", REALMS_DIR, realm.realm);
            let body = serde_json::to_string_pretty(realm).map_err(|e| MergeError::render(&path, e))?;
            stack.add_config(path, body);
        }
        stack.add_script(MIGRATE_SCRIPT, migration_script(&realms));

        let keycloak = opts.prefixed("keycloak");
        let database_host = opts.prefixed("postgres");
        stack.add_service(
            Service::new(&keycloak, "quay.io/keycloak/keycloak:24.0")
                .with_command(["start-dev", "--import-realm"])
                .with_port("8180:8080")
                .with_env("KEYCLOAK_ADMIN", "admin")
                .with_env("KEYCLOAK_ADMIN_PASSWORD", "${KEYCLOAK_ADMIN_PASSWORD:-changeme}")
                .with_env("KC_DB", "postgres")
                .with_env("KC_DB_URL", format!("jdbc:postgresql://{}:5432/keycloak", database_host))
                .with_env("KC_DB_USERNAME", "postgres")
                .with_env("KC_DB_PASSWORD", "${POSTGRES_PASSWORD:-changeme}")
                .with_env("KC_HEALTH_ENABLED", "true")
                .with_volume(format!("./{}:/opt/keycloak/data/import:ro", REALMS_DIR))
                .with_network(common::stack_network(opts, StackType::Auth))
                .with_network(common::stack_network(opts, StackType::Database)),
        );
        stack.add_dependency(StackType::Database);
        stack.set_metadata("realms", realms.iter().map(|r| r.realm.as_str()).collect::<Vec<_>>().join(","));

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step(format!("Create the keycloak database on {} before the first start", database_host));
        stack.add_manual_step(format!(
            "Export users from each source pool and run {} <realm> <users.csv>; passwords cannot be exported and users must reset them",
            MIGRATE_SCRIPT
        ));
        stack.add_manual_step("Replace placeholder redirect URIs and update application issuer URLs");
        Ok(stack)
    }
}
