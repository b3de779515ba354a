//! Secret stores, key vaults and parameter stores folded into one Vault
//!
//! Access policies are translated by keyword into Vault capabilities. The translation is lossy;
//! original action strings stay in the stack metadata for review.

use super::common::{self, NameAllocator};
use super::{MergeContext, MergeOptions, Merger};
use crate::error::MergeError;
use crate::model::{Effect, HealthCheck, MappingResult, PolicyStatement, Service, Stack, StackType, Volume};
use crate::taxonomy::{Category, Provider, ResourceType};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

pub const CONFIG_PATH: &str = "vault/config/vault.hcl";
pub const POLICIES_DIR: &str = "vault/policies";
pub const INIT_SCRIPT: &str = "scripts/vault-init.sh";
pub const MIGRATE_SCRIPT: &str = "scripts/migrate-secrets.sh";

const KV_MOUNT: &str = "secret";

pub struct SecretsMerger;

/// Vault policy capability, in Vault's canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Create => "create",
            Capability::Read => "read",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::List => "list",
        }
    }

    pub fn full() -> BTreeSet<Capability> {
        [
            Capability::Create,
            Capability::Read,
            Capability::Update,
            Capability::Delete,
            Capability::List,
        ]
        .into_iter()
        .collect()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const READ_KEYWORDS: &[&str] = &["get", "describe", "list", "read", "decrypt", "access", "view"];
const WRITE_KEYWORDS: &[&str] = &["put", "create", "update", "set", "add", "encrypt", "restore", "rotate", "write", "tag"];
const DELETE_KEYWORDS: &[&str] = &["delete", "remove", "destroy", "purge", "schedule"];

/// Capabilities implied by one source action such as `secretsmanager:GetSecretValue`.
///
/// Returns `None` for actions no keyword recognises.
pub fn classify_action(action: &str) -> Option<BTreeSet<Capability>> {
    let mut segments = action
        .split(|c: char| c == ':' || c == '.' || c == '/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .rev();
    let mut verb = segments.next().unwrap_or_default().to_lowercase();
    // Azure data actions end in `/action`, the operation is the segment before it
    if verb == "action" {
        if let Some(operation) = segments.next() {
            verb = operation.to_lowercase();
        }
    }
    if verb == "*" || action.trim() == "*" {
        return Some(Capability::full());
    }

    // the source's own prefixes decide before any keyword does
    let mut caps = BTreeSet::new();
    if DELETE_KEYWORDS.iter().any(|k| verb.starts_with(k)) {
        caps.insert(Capability::Delete);
    } else if WRITE_KEYWORDS.iter().any(|k| verb.starts_with(k)) {
        caps.insert(Capability::Create);
        caps.insert(Capability::Update);
    } else if READ_KEYWORDS.iter().any(|k| verb.starts_with(k) || verb.contains(k)) {
        caps.insert(Capability::Read);
        caps.insert(Capability::List);
    } else {
        return None;
    }
    Some(caps)
}

/// Allow-only capability set for a list of statements, plus the warnings it produced.
pub fn translate_statements(
    source: &str,
    statements: &[PolicyStatement],
) -> (BTreeSet<Capability>, Vec<String>) {
    let mut caps = BTreeSet::new();
    let mut warnings = Vec::new();
    for statement in statements {
        if statement.effect == Effect::Deny {
            warnings.push(format!(
                "{}: deny statement dropped; Vault policies are allow-only",
                source
            ));
            continue;
        }
        for action in &statement.actions {
            match classify_action(action) {
                Some(found) => caps.extend(found),
                None => warnings.push(format!("{}: action {} has no Vault capability", source, action)),
            }
        }
    }
    (caps, warnings)
}

fn service_segment(result: &MappingResult) -> &'static str {
    match result.resource_type() {
        Some(ResourceType::AwsSecretsmanagerSecret) => "secrets-manager",
        Some(ResourceType::AwsSsmParameter) => "parameter-store",
        Some(ResourceType::AwsKmsKey) => "kms",
        Some(ResourceType::GoogleSecretManagerSecret) => "secret-manager",
        Some(ResourceType::GoogleKmsKeyRing) | Some(ResourceType::GoogleKmsCryptoKey) => "kms",
        Some(ResourceType::AzurermKeyVault) | Some(ResourceType::AzurermKeyVaultSecret) => "key-vault",
        Some(ResourceType::AzurermKeyVaultKey) => "key-vault-keys",
        _ => match result.category() {
            Some(Category::KeyManagement) => "kms",
            Some(Category::Configuration) => "config",
            _ => "secrets",
        },
    }
}

fn is_key(result: &MappingResult) -> bool {
    result.category() == Some(Category::KeyManagement)
}

/// One secret's place in Vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretPath {
    pub provider: String,
    pub service: &'static str,
    pub name: String,
}

impl SecretPath {
    /// Path as seen by the API and policies: `secret/data/<provider>/<service>/<name>`.
    pub fn data_path(&self) -> String {
        format!("{}/data/{}", KV_MOUNT, self.relative())
    }

    pub fn metadata_path(&self) -> String {
        format!("{}/metadata/{}", KV_MOUNT, self.relative())
    }

    /// Path as taken by `vault kv` commands.
    pub fn cli_path(&self) -> String {
        format!("{}/{}", KV_MOUNT, self.relative())
    }

    fn relative(&self) -> String {
        format!("{}/{}/{}", self.provider, self.service, self.name)
    }
}

/// Deterministic path per source, de-duplicated inside its provider/service prefix.
pub fn assign_paths(results: &[MappingResult]) -> Vec<SecretPath> {
    let mut used = NameAllocator::new();
    results
        .iter()
        .map(|result| {
            let provider = result
                .provider()
                .map(|p| p.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let service = service_segment(result);
            let prefix = format!("{}/{}/", provider, service);
            let full = used.allocate(&format!("{}{}", prefix, common::normalize_name(&result.source_name)));
            SecretPath {
                provider,
                service,
                name: full[prefix.len()..].to_string(),
            }
        })
        .collect()
}

fn render_policy(source: &MappingResult, path: &SecretPath, caps: &BTreeSet<Capability>) -> String {
    let quoted: Vec<String> = caps.iter().map(|c| format!("\"{}\"", c)).collect();
    let mut hcl = format!("# source: {}.{}\n", source.source_type, source.source_name);
    hcl.push_str(&format!("path \"{}\" {{\n", path.data_path()));
    hcl.push_str(&format!("  capabilities = [{}]\n}}\n", quoted.join(", ")));
    if caps.contains(&Capability::List) {
        hcl.push_str(&format!(
            "\npath \"{}\" {{\n  capabilities = [\"list\"]\n}}\n",
            path.metadata_path()
        ));
    }
    hcl
}

fn vault_config() -> String {
    let mut hcl = String::new();
    hcl.push_str("storage \"file\" {\n  path = \"/vault/file\"\n}\n\n");
    hcl.push_str("listener \"tcp\" {\n  address     = \"0.0.0.0:8200\"\n  tls_disable = 1\n}\n\n");
    hcl.push_str("api_addr      = \"http://0.0.0.0:8200\"\n");
    hcl.push_str("ui            = true\n");
    hcl.push_str("disable_mlock = true\n");
    hcl
}

/// Initialises, unseals and configures Vault; every step tolerates having already run.
fn init_script() -> String {
    let mut script = common::script_header("Initialises and unseals Vault; safe to re-run");
    script.push_str("export VAULT_ADDR=\"${VAULT_ADDR:-http://127.0.0.1:8200}\"\n");
    script.push_str("INIT_FILE=\"${INIT_FILE:-./vault-init.json}\"\n\n");
    script.push_str(
        r#"# exit code 2 means sealed, which is expected after every restart
status=0
status_json="$(vault status -format=json 2>/dev/null)" || status=$?
if [ "$status" -eq 1 ]; then
  echo "vault is unreachable at $VAULT_ADDR" >&2
  exit 1
fi

if printf '%s' "$status_json" | jq -e '.initialized' >/dev/null; then
  echo "vault already initialized"
else
  vault operator init -key-shares=1 -key-threshold=1 -format=json > "$INIT_FILE"
  chmod 600 "$INIT_FILE"
fi

if printf '%s' "$status_json" | jq -e '.sealed' >/dev/null; then
  [ -f "$INIT_FILE" ] || { echo "vault is sealed and $INIT_FILE is missing" >&2; exit 1; }
  vault operator unseal "$(jq -r '.unseal_keys_b64[0]' "$INIT_FILE")"
else
  echo "vault already unsealed"
fi

export VAULT_TOKEN="${VAULT_TOKEN:-$(jq -r '.root_token' "$INIT_FILE")}"
vault secrets list -format=json | jq -e '."secret/"' >/dev/null || vault secrets enable -path=secret kv-v2

for policy in vault/policies/*.hcl; do
  [ -e "$policy" ] || continue
  vault policy write "$(basename "$policy" .hcl)" "$policy"
done
"#,
    );
    script
}

fn fetch_command(result: &MappingResult) -> Option<String> {
    let name = common::shell_quote(&result.source_name);
    let command = match result.resource_type() {
        Some(ResourceType::AwsSecretsmanagerSecret) => format!(
            "aws secretsmanager get-secret-value --secret-id {} --query SecretString --output text",
            name
        ),
        Some(ResourceType::AwsSsmParameter) => format!(
            "aws ssm get-parameter --with-decryption --name {} --query Parameter.Value --output text",
            name
        ),
        Some(ResourceType::GoogleSecretManagerSecret) => {
            format!("gcloud secrets versions access latest --secret={}", name)
        }
        Some(ResourceType::AzurermKeyVaultSecret) => format!(
            "az keyvault secret show --vault-name \"${{AZURE_VAULT_NAME:?}}\" --name {} --query value -o tsv",
            name
        ),
        _ => return None,
    };
    Some(command)
}

fn migration_script(results: &[MappingResult], paths: &[SecretPath]) -> String {
    let mut script = common::script_header("Copies secret values from the source stores into Vault");
    script.push_str("export VAULT_ADDR=\"${VAULT_ADDR:-http://127.0.0.1:8200}\"\n");
    script.push_str(": \"${VAULT_TOKEN:?set VAULT_TOKEN}\"\n\n");

    let mut providers: Vec<Provider> = results.iter().filter_map(MappingResult::provider).collect();
    providers.sort();
    providers.dedup();
    for provider in providers {
        script.push_str(&format!("# --- {} ---\n", provider.name()));
        for (result, path) in results.iter().zip(paths) {
            if result.provider() != Some(provider) {
                continue;
            }
            match fetch_command(result) {
                Some(command) => script.push_str(&format!(
                    "value=\"$({})\"\nvault kv put {} value=\"$value\"\n\n",
                    command,
                    common::shell_quote(&path.cli_path())
                )),
                None => script.push_str(&format!(
                    "echo \"skipping {}: not exportable, recreate manually\"\n\n",
                    result.source_name
                )),
            }
        }
    }
    script
}

#[async_trait]
impl Merger for SecretsMerger {
    fn stack_type(&self) -> StackType {
        StackType::Secrets
    }

    fn can_merge(&self, results: &[MappingResult]) -> bool {
        common::any_applicable(
            results,
            |t| {
                matches!(t.category(), Category::Secrets | Category::KeyManagement)
                    || t == ResourceType::AwsSsmParameter
            },
            &["secret", "secrets", "kms", "vault", "key", "parameter"],
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
                stack_type: StackType::Secrets,
            });
        }

        let mut stack = common::new_stack(StackType::Secrets, results, opts)
            .with_description(format!("Vault holding {} secrets and keys", results.len()));
        let paths = assign_paths(results);

        let mut policy_names = NameAllocator::new();
        for (result, path) in results.iter().zip(&paths) {
            stack.set_metadata(format!("path.{}", result.source_name), path.data_path());
            if result.policies.is_empty() {
                continue;
            }

            let (caps, warnings) = translate_statements(&result.source_name, &result.policies);
            for warning in warnings {
                stack.add_warning(warning);
            }
            let actions: Vec<&str> = result
                .policies
                .iter()
                .flat_map(|s| s.actions.iter().map(String::as_str))
                .collect();
            let policy = policy_names.allocate(&format!("{}-{}-{}", path.provider, path.service, path.name));
            stack.set_metadata(format!("actions.{}", policy), actions.join(","));

            if caps.is_empty() {
                stack.add_warning(format!(
                    "{}: no allow statement translated; policy {} not generated",
                    result.source_name, policy
                ));
                continue;
            }
            stack.set_metadata(
                format!("capabilities.{}", policy),
                caps.iter().map(Capability::as_str).collect::<Vec<_>>().join(","),
            );
            stack.add_config(format!("{}/{}.hcl", POLICIES_DIR, policy), render_policy(result, path, &caps));
        }
        debug!(secrets = paths.len(), "Assigned Vault paths");

        stack.add_config(CONFIG_PATH, vault_config());
        stack.add_script(INIT_SCRIPT, init_script());
        stack.add_script(MIGRATE_SCRIPT, migration_script(results, &paths));

        let vault = opts.prefixed("vault");
        stack.add_service(
            Service::new(&vault, "hashicorp/vault:1.15")
                .with_command(["server"])
                .with_port("8200:8200")
                .with_env("VAULT_ADDR", "http://127.0.0.1:8200")
                .with_env("VAULT_CONFIG_DIR", "/vault/config")
                .with_volume(format!("{}-data:/vault/file", vault))
                .with_volume("./vault/config:/vault/config:ro")
                .with_network(common::stack_network(opts, StackType::Secrets))
                .with_healthcheck(HealthCheck::shell(
                    "vault status -address=http://127.0.0.1:8200 >/dev/null 2>&1; [ $? -ne 1 ]",
                )),
        );
        stack.add_volume(Volume::named(format!("{}-data", vault)));

        common::absorb_sources(&mut stack, results);

        stack.add_manual_step(format!(
            "Run {} once, then move the unseal key and root token out of vault-init.json into safe storage",
            INIT_SCRIPT
        ));
        stack.add_manual_step(format!(
            "Run {} and rotate every secret once applications read from Vault",
            MIGRATE_SCRIPT
        ));
        stack.add_manual_step("Review translated policies against the original actions kept in stack metadata");
        if results.iter().any(is_key) {
            stack.add_manual_step(
                "Key material of managed encryption keys cannot be exported; create new keys and re-encrypt data",
            );
        }
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    async fn merge(results: &[MappingResult]) -> Stack {
        SecretsMerger
            .merge(&MergeContext::new(), results, &MergeOptions::default())
            .await
            .unwrap()
    }

    fn caps(names: &[Capability]) -> BTreeSet<Capability> {
        names.iter().copied().collect()
    }

    #[parameterized(
        get_value = { "secretsmanager:GetSecretValue", &[Capability::Read, Capability::List] },
        describe = { "secretsmanager:DescribeSecret", &[Capability::Read, Capability::List] },
        put = { "secretsmanager:PutSecretValue", &[Capability::Create, Capability::Update] },
        delete = { "secretsmanager:DeleteSecret", &[Capability::Delete] },
        wildcard = { "secretsmanager:*", &[Capability::Create, Capability::Read, Capability::Update, Capability::Delete, Capability::List] },
        gcp_access = { "secretmanager.versions.access", &[Capability::Read, Capability::List] },
        gcp_add = { "secretmanager.versions.add", &[Capability::Create, Capability::Update] },
        azure_write = { "Microsoft.KeyVault/vaults/secrets/write", &[Capability::Create, Capability::Update] },
        azure_delete = { "Microsoft.KeyVault/vaults/secrets/delete", &[Capability::Delete] },
        azure_read = { "Microsoft.KeyVault/vaults/secrets/read", &[Capability::Read, Capability::List] },
        azure_access_policy = { "Microsoft.KeyVault/vaults/accessPolicies/write", &[Capability::Create, Capability::Update] },
        azure_data_action = { "Microsoft.KeyVault/vaults/secrets/getSecret/action", &[Capability::Read, Capability::List] },
    )]
    fn test_classify_action(action: &str, expected: &[Capability]) {
        assert_eq!(classify_action(action), Some(caps(expected)));
    }

    #[test]
    fn test_unknown_action() {
        assert_eq!(classify_action("iam:PassRole"), None);
    }

    #[tokio::test]
    async fn test_read_only_policy() {
        let results = vec![MappingResult::new("aws_secretsmanager_secret", "db-password")
            .with_policy(PolicyStatement::allow(["secretsmanager:GetSecretValue"]))];
        let stack = merge(&results).await;

        assert_eq!(
            stack.metadata["path.db-password"],
            "secret/data/aws/secrets-manager/db-password"
        );
        let policy = &stack.configs["vault/policies/aws-secrets-manager-db-password.hcl"];
        assert!(policy.contains("capabilities = [\"read\", \"list\"]"));
        assert!(!policy.contains("create"));
        assert!(!policy.contains("delete"));
        assert_eq!(
            stack.metadata["actions.aws-secrets-manager-db-password"],
            "secretsmanager:GetSecretValue"
        );
    }

    #[tokio::test]
    async fn test_distinct_service_prefixes() {
        let results = vec![
            MappingResult::new("aws_secretsmanager_secret", "api"),
            MappingResult::new("aws_ssm_parameter", "api"),
            MappingResult::new("aws_kms_key", "api"),
            MappingResult::new("google_secret_manager_secret", "api"),
            MappingResult::new("azurerm_key_vault_secret", "api"),
        ];
        let stack = merge(&results).await;
        let assigned = assign_paths(&results);
        let data: Vec<String> = assigned.iter().map(SecretPath::data_path).collect();
        assert_eq!(
            data,
            vec![
                "secret/data/aws/secrets-manager/api",
                "secret/data/aws/parameter-store/api",
                "secret/data/aws/kms/api",
                "secret/data/gcp/secret-manager/api",
                "secret/data/azure/key-vault/api",
            ]
        );
        assert!(stack.manual_steps.iter().any(|s| s.contains("cannot be exported")));
    }

    #[test]
    fn test_duplicate_paths_suffixed() {
        let results = vec![
            MappingResult::new("aws_secretsmanager_secret", "token"),
            MappingResult::new("aws_secretsmanager_secret", "Token"),
        ];
        let assigned = assign_paths(&results);
        assert_eq!(assigned[1].data_path(), "secret/data/aws/secrets-manager/token-2");
    }

    #[tokio::test]
    async fn test_deny_dropped_with_warning() {
        let results = vec![MappingResult::new("aws_secretsmanager_secret", "s")
            .with_policy(PolicyStatement::deny(["secretsmanager:DeleteSecret"]))
            .with_policy(PolicyStatement::allow(["secretsmanager:GetSecretValue"]))];
        let stack = merge(&results).await;
        assert!(stack.warnings.iter().any(|w| w.contains("deny statement dropped")));
        assert_eq!(stack.metadata["capabilities.aws-secrets-manager-s"], "read,list");
    }

    #[cfg(unix)]
    mod init_script_runs {
        use super::super::init_script;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use std::process::Command;

        const STUB_VAULT: &str = r#"#!/usr/bin/env bash
echo "$*" >> "$CALLS"
case "$1 $2" in
  "status "*|"status -format=json")
    if [ "${2:-}" = "-format=json" ]; then echo "$STATUS_JSON"; fi
    exit "$STATUS_CODE" ;;
  "operator init")
    echo '{"unseal_keys_b64":["fresh-key"],"root_token":"fresh-token"}' ;;
  "secrets list")
    echo '{"secret/":{}}' ;;
esac
exit 0
"#;

        fn has_tools() -> bool {
            ["bash", "jq"].iter().all(|tool| {
                Command::new(tool)
                    .arg("--version")
                    .output()
                    .map(|o| o.status.success())
                    .unwrap_or(false)
            })
        }

        /// Runs the init script against a stub `vault`, returning success and the recorded calls.
        fn run(dir: &Path, status_json: &str, status_code: i32) -> (bool, Vec<String>) {
            let bin = dir.join("bin");
            fs::create_dir_all(&bin).unwrap();
            let stub = bin.join("vault");
            fs::write(&stub, STUB_VAULT).unwrap();
            fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();
            let script = dir.join("vault-init.sh");
            fs::write(&script, init_script()).unwrap();

            let calls = dir.join("calls.log");
            let path = format!("{}:{}", bin.display(), std::env::var("PATH").unwrap_or_default());
            let status = Command::new("bash")
                .arg(&script)
                .current_dir(dir)
                .env("PATH", path)
                .env("CALLS", &calls)
                .env("STATUS_JSON", status_json)
                .env("STATUS_CODE", status_code.to_string())
                .env("INIT_FILE", dir.join("vault-init.json"))
                .env_remove("VAULT_TOKEN")
                .status()
                .unwrap();
            let recorded = fs::read_to_string(&calls).unwrap_or_default();
            (status.success(), recorded.lines().map(str::to_string).collect())
        }

        #[test]
        fn test_sealed_vault_is_unsealed_not_reinitialized() {
            if !has_tools() {
                return;
            }
            let dir = tempfile::tempdir().unwrap();
            fs::write(
                dir.path().join("vault-init.json"),
                r#"{"unseal_keys_b64":["saved-key"],"root_token":"saved-token"}"#,
            )
            .unwrap();

            let (ok, calls) = run(dir.path(), r#"{"initialized":true,"sealed":true}"#, 2);
            assert!(ok, "calls: {:?}", calls);
            assert!(!calls.iter().any(|c| c.starts_with("operator init")));
            assert!(calls.iter().any(|c| c == "operator unseal saved-key"));
        }

        #[test]
        fn test_unsealed_vault_is_left_alone() {
            if !has_tools() {
                return;
            }
            let dir = tempfile::tempdir().unwrap();
            fs::write(
                dir.path().join("vault-init.json"),
                r#"{"unseal_keys_b64":["saved-key"],"root_token":"saved-token"}"#,
            )
            .unwrap();

            let (ok, calls) = run(dir.path(), r#"{"initialized":true,"sealed":false}"#, 0);
            assert!(ok, "calls: {:?}", calls);
            assert!(!calls.iter().any(|c| c.starts_with("operator")));
        }

        #[test]
        fn test_fresh_vault_is_initialized_and_unsealed() {
            if !has_tools() {
                return;
            }
            let dir = tempfile::tempdir().unwrap();

            let (ok, calls) = run(dir.path(), r#"{"initialized":false,"sealed":true}"#, 2);
            assert!(ok, "calls: {:?}", calls);
            assert!(calls.iter().any(|c| c.starts_with("operator init")));
            assert!(calls.iter().any(|c| c == "operator unseal fresh-key"));
        }
    }

    #[tokio::test]
    async fn test_init_script_tolerates_rerun() {
        let stack = merge(&[MappingResult::new("aws_secretsmanager_secret", "s")]).await;
        let script = &stack.scripts[INIT_SCRIPT];
        assert!(script.contains("vault already initialized"));
        assert!(script.contains("vault already unsealed"));
        let migrate = &stack.scripts[MIGRATE_SCRIPT];
        assert!(migrate.contains("vault kv put 'secret/aws/secrets-manager/s'"));
    }
}
