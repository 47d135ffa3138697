// src/bootstrap/probe.rs

/// Script run on the representative instance.
///
/// Prints the root token when the service was not initialized yet (and
/// initializes it), or an empty line when it already was.
pub fn init_probe_script(service_cli: &str) -> String {
    format!(
        r#"#!/bin/bash
export VAULT_SKIP_VERIFY=true

status_output=$({cli} status -format=json)
is_initialized=$(echo "$status_output" | jq -r '.initialized')

if [ "$is_initialized" == "false" ]; then
    init_output=$({cli} operator init -recovery-shares=1 -recovery-threshold=1 -format=json)
    echo "$init_output" | jq -r '.root_token'
else
    echo ""
fi
"#,
        cli = service_cli
    )
}
