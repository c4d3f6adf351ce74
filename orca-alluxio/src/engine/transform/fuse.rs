//! Stage 5: fuse component transform, including the version-gated
//! argument shape.

use std::sync::OnceLock;

use regex::Regex;
use semver::Version;
use tracing::{debug, warn};

use super::TransformContext;
use crate::engine::error::Result;
use crate::engine::value::AlluxioValue;
use crate::engine::AlluxioEngine;

/// From this runtime version on, the mount point and root path travel
/// as trailing positional arguments instead of the MOUNT_POINT
/// environment variable.
fn new_fuse_arg_version() -> Version {
    Version::new(2, 8, 0)
}

/// Pulls the first `x.y.z` out of an image tag like
/// `release-2.8.0-SNAPSHOT-abc123`; tags without one count as old.
fn parse_tag_version(tag: &str) -> Option<Version> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let pattern = RE.get_or_init(|| {
        Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("static pattern")
    });
    let caps = pattern.captures(tag)?;
    Version::parse(&format!("{}.{}.{}", &caps[1], &caps[2], &caps[3])).ok()
}

fn uses_new_fuse_args(tag: &str) -> bool {
    match parse_tag_version(tag) {
        Some(version) => version >= new_fuse_arg_version(),
        None => {
            warn!(%tag, "fuse image tag carries no version, assuming old argument shape");
            false
        }
    }
}

impl AlluxioEngine {
    pub(super) fn transform_fuse(
        &self,
        ctx: &TransformContext<'_>,
        mut value: AlluxioValue,
    ) -> Result<AlluxioValue> {
        let spec = &ctx.spec.fuse;

        value.fuse.image = if spec.image.is_empty() {
            self.config.image.fuse_image.clone()
        } else {
            spec.image.clone()
        };
        value.fuse.image_tag = if spec.image_tag.is_empty() {
            self.config.image.fuse_image_tag.clone()
        } else {
            spec.image_tag.clone()
        };
        value.fuse.image_pull_policy = if spec.image_pull_policy.is_empty() {
            self.config.image.pull_policy.clone()
        } else {
            spec.image_pull_policy.clone()
        };

        value.fuse.jvm_options = if spec.jvm_options.is_empty() {
            vec![
                "-Xmx16G".to_string(),
                "-Xms16G".to_string(),
                "-XX:+UseG1GC".to_string(),
                "-XX:MaxDirectMemorySize=32g".to_string(),
                "-XX:+UnlockExperimentalVMOptions".to_string(),
            ]
        } else {
            spec.jvm_options.clone()
        };

        value.fuse.env = spec.env.clone();
        value.fuse.properties = spec.properties.clone();
        value.fuse.mount_path = self.mount_path();

        let read_only = ctx
            .dataset
            .spec
            .access_modes
            .iter()
            .any(|m| m == "ReadOnlyMany");

        value.fuse.args = if spec.args.is_empty() {
            if read_only {
                vec![
                    "fuse".to_string(),
                    "--fuse-opts=kernel_cache,ro,max_read=131072,attr_timeout=7200,entry_timeout=7200,nonempty"
                        .to_string(),
                ]
            } else {
                vec![
                    "fuse".to_string(),
                    "--fuse-opts=kernel_cache,rw,max_read=131072".to_string(),
                ]
            }
        } else {
            spec.args.clone()
        };

        // ownership: either bake uid/gid into the fuse options, or fall
        // back to translating ownership at the runtime level
        if let Some(run_as) = &ctx.spec.run_as {
            append_fuse_opts(
                &mut value.fuse.args,
                &format!("uid={},gid={}", run_as.uid, run_as.gid),
            );
        } else {
            value.fuse.properties.insert(
                "alluxio.fuse.user.group.translation.enabled".to_string(),
                "true".to_string(),
            );
        }

        if !fuse_opts_contain(&value.fuse.args, "allow_") {
            append_fuse_opts(&mut value.fuse.args, "allow_other");
        }

        if uses_new_fuse_args(&value.fuse.image_tag) {
            debug!(tag = %value.fuse.image_tag, "new fuse argument shape");
            let mount_path = value.fuse.mount_path.clone();
            value.fuse.args.push(mount_path);
            value.fuse.args.push("/".to_string());
        } else {
            debug!(tag = %value.fuse.image_tag, "legacy fuse argument shape");
            value
                .fuse
                .env
                .insert("MOUNT_POINT".to_string(), value.fuse.mount_path.clone());
        }

        value.fuse.node_selector = spec.node_selector.clone();
        if !spec.global {
            value
                .fuse
                .node_selector
                .insert(self.common_label_name(), "true".to_string());
        }
        value.fuse.global = spec.global;
        value.fuse.host_network = spec.uses_host_network();
        value.fuse.resources = spec.resources.clone();
        value.fuse.enabled = true;

        Ok(value)
    }
}

fn fuse_opts_arg(args: &mut [String]) -> Option<&mut String> {
    args.iter_mut().find(|a| a.starts_with("--fuse-opts="))
}

fn fuse_opts_contain(args: &[String], token: &str) -> bool {
    args.iter()
        .find(|a| a.starts_with("--fuse-opts="))
        .map(|a| a.contains(token))
        .unwrap_or(false)
}

fn append_fuse_opts(args: &mut [String], extra: &str) {
    if let Some(opts) = fuse_opts_arg(args) {
        opts.push(',');
        opts.push_str(extra);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_new_argument_versions() {
        assert!(uses_new_fuse_args("2.8.0"));
        assert!(uses_new_fuse_args("release-2.8.0-SNAPSHOT-abc123"));
        assert!(uses_new_fuse_args("2.9.1"));
        assert!(!uses_new_fuse_args("release-2.7.3-SNAPSHOT"));
        assert!(!uses_new_fuse_args("latest"));
    }

    #[test]
    fn appends_to_fuse_opts_argument() {
        let mut args = vec![
            "fuse".to_string(),
            "--fuse-opts=kernel_cache,rw".to_string(),
        ];
        append_fuse_opts(&mut args, "allow_other");
        assert_eq!(args[1], "--fuse-opts=kernel_cache,rw,allow_other");
        assert!(fuse_opts_contain(&args, "allow_"));
    }
}
