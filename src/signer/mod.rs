/*!
The signer forwarder: hands unsigned packages to an external signer
frontend named by `spec.targets[key].signer`, and substitutes its output
back into the pipeline.
*/

pub mod error;

use crate::graph::GraphState;
use crate::spec::Spec;
use error::Result;
use tracing::instrument;

/// `true` if signing is currently suppressed via build-arg (the caller
/// passes in whatever `build_opts()["DALEC_SKIP_SIGNING"]` resolved to).
pub fn is_signing_disabled(build_opts: &std::collections::BTreeMap<String, String>) -> bool {
    build_opts.get("DALEC_SKIP_SIGNING").map(String::as_str) == Some("true")
}

/// Forward `unsigned` to the signer declared on `target_key`, if any and if
/// signing is not disabled. Returns the original state unchanged when no
/// signer is declared or signing is disabled.
#[instrument(level = "info", skip(client, spec, unsigned), fields(package = %spec.name, target_key))]
pub async fn maybe_sign<C: crate::graph::BuildClient>(
    client: &C,
    spec: &Spec,
    target_key: &str,
    unsigned: GraphState,
    signing_disabled: bool,
) -> Result<GraphState> {
    let Some(signer) = spec.signer_for(target_key) else {
        tracing::debug!("no signer declared, forwarding unsigned output");
        return Ok(unsigned);
    };
    if signing_disabled {
        tracing::info!("signing disabled via build-arg, forwarding unsigned output");
        return Ok(unsigned);
    }
    tracing::info!(image = %signer.image, "forwarding to signer");

    let signer_image = crate::graph::GraphState::new(crate::graph::GraphOp::Image {
        ref_: signer.image.clone(),
        cmd: signer.cmdline.clone(),
        path: None,
    });

    let mut mounts = vec![crate::graph::Mount {
        dest: "/src".to_string(),
        source: unsigned.clone(),
        read_only: true,
    }];
    for (k, v) in &signer.args {
        mounts.push(crate::graph::Mount {
            dest: format!("/args/{k}"),
            source: crate::graph::GraphState::new(crate::graph::GraphOp::File {
                path: k.clone(),
                contents: v.clone().into_bytes(),
                mode: 0o644,
            }),
            read_only: true,
        });
    }

    let signing_run = GraphState::new(crate::graph::GraphOp::Run {
        base: Box::new(signer_image),
        command: signer.cmdline.clone().unwrap_or_else(|| "/sign".to_string()),
        env: Default::default(),
        mounts,
        network: crate::graph::NetworkPolicy::None,
        cache_mounts: vec![],
    });

    client
        .solve(&signing_run)
        .await
        .map_err(|e| error::Error::SignFailed {
            target_key: target_key.to_string(),
            detail: e.to_string(),
        })?;

    Ok(signing_run)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_disabled_flag_reads_build_opt() {
        let mut opts = std::collections::BTreeMap::new();
        assert!(!is_signing_disabled(&opts));
        opts.insert("DALEC_SKIP_SIGNING".to_string(), "true".to_string());
        assert!(is_signing_disabled(&opts));
    }
}
