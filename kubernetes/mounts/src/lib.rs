/*
   Polar (OSS)

   Copyright 2024 Carnegie Mellon University.

   NO WARRANTY. THIS CARNEGIE MELLON UNIVERSITY AND SOFTWARE ENGINEERING INSTITUTE MATERIAL IS
   FURNISHED ON AN "AS-IS" BASIS. CARNEGIE MELLON UNIVERSITY MAKES NO WARRANTIES OF ANY KIND,
   EITHER EXPRESSED OR IMPLIED, AS TO ANY MATTER INCLUDING, BUT NOT LIMITED TO, WARRANTY OF FITNESS
   FOR PURPOSE OR MERCHANTABILITY, EXCLUSIVITY, OR RESULTS OBTAINED FROM USE OF THE MATERIAL.
   CARNEGIE MELLON UNIVERSITY DOES NOT MAKE ANY WARRANTY OF ANY KIND WITH RESPECT TO FREEDOM FROM
   PATENT, TRADEMARK, OR COPYRIGHT INFRINGEMENT.

   Licensed under a MIT-style license, please see license.txt or contact permission@sei.cmu.edu for
   full terms.

   [DISTRIBUTION STATEMENT A] This material has been approved for public release and unlimited
   distribution.  Please see Copyright notice for non-US Government use and distribution.

   This Software includes and/or makes use of Third-Party Software each subject to its own license.

   DM24-0470
*/
//! Pod modifiers for pipeline containers.
//!
//! A modifier mutates a `PodSpec` to mount volumes, project secrets or config
//! maps as files, or inject the environment variables a pipeline step needs
//! before it can run. Modifiers compose: each touches every container (init
//! containers included) and is idempotent per volume name.
//!
//! Vendor-specific modifiers (v3io, s3 credential wiring, spark conf) are
//! not supported by this adapter and report [`MountError::NotSupported`].

use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, HostPathVolumeSource, KeyToPath,
    PersistentVolumeClaimVolumeSource, PodSpec, SecretVolumeSource, Volume, VolumeMount,
};
use std::collections::BTreeMap;
use std::env;
use thiserror::Error;

/// Environment variable carrying an implicit PVC mount as `<pvc-name>:<mount-path>`
pub const PVC_MOUNT_ENV_VAR: &str = "MLRUN_PVC_MOUNT";

const V3IO_ACCESS_KEY_ENV_VAR: &str = "V3IO_ACCESS_KEY";
const V3IO_USERNAME_ENV_VAR: &str = "V3IO_USERNAME";

/// A reusable pod spec transformation.
pub type PodModifier = Box<dyn Fn(&mut PodSpec) -> Result<(), MountError> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountError {
    #[error("{0} mounts are not supported by this adapter")]
    NotSupported(&'static str),

    #[error("no auto-mount source is configured")]
    NoAutoMountAvailable,

    #[error("invalid mount specification: {0}")]
    InvalidSpec(String),
}

/// Run each modifier against the spec, in order.
pub fn apply_all(spec: &mut PodSpec, modifiers: &[PodModifier]) -> Result<(), MountError> {
    for modifier in modifiers {
        modifier(spec)?;
    }
    Ok(())
}

/// Add the volume, replacing any previous definition with the same name.
fn upsert_volume(spec: &mut PodSpec, volume: Volume) {
    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    volumes.retain(|v| v.name != volume.name);
    volumes.push(volume);
}

fn containers_mut(spec: &mut PodSpec) -> impl Iterator<Item = &mut Container> {
    spec.containers
        .iter_mut()
        .chain(spec.init_containers.iter_mut().flatten())
}

/// Mount the named volume into every container, replacing a previous mount
/// of the same volume name.
fn mount_on_all_containers(spec: &mut PodSpec, mount: &VolumeMount) {
    for container in containers_mut(spec) {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        mounts.retain(|m| m.name != mount.name);
        mounts.push(mount.clone());
    }
}

fn set_env_on_all_containers(spec: &mut PodSpec, name: &str, value: &str) {
    for container in containers_mut(spec) {
        let env = container.env.get_or_insert_with(Vec::new);
        env.retain(|e| e.name != name);
        env.push(EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        });
    }
}

/// Modifier mounting a persistent volume claim on every container.
/// Simplifies volume + mount addition and lets one claim be reused across
/// pipeline steps.
pub fn mount_pvc(
    pvc_name: impl Into<String>,
    volume_name: impl Into<String>,
    volume_mount_path: impl Into<String>,
) -> PodModifier {
    let pvc_name = pvc_name.into();
    let volume_name = volume_name.into();
    let mount_path = volume_mount_path.into();

    Box::new(move |spec| {
        upsert_volume(
            spec,
            Volume {
                name: volume_name.clone(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: pvc_name.clone(),
                    read_only: None,
                }),
                ..Default::default()
            },
        );
        mount_on_all_containers(
            spec,
            &VolumeMount {
                name: volume_name.clone(),
                mount_path: mount_path.clone(),
                ..Default::default()
            },
        );
        Ok(())
    })
}

/// Modifier mounting a kubernetes secret as files.
///
/// When `items` is unspecified every key in the secret's data becomes a file
/// named after the key; otherwise only the listed keys are projected, at the
/// listed paths.
pub fn mount_secret(
    secret_name: impl Into<String>,
    mount_path: impl Into<String>,
    volume_name: impl Into<String>,
    items: Option<Vec<KeyToPath>>,
) -> PodModifier {
    let secret_name = secret_name.into();
    let mount_path = mount_path.into();
    let volume_name = volume_name.into();

    Box::new(move |spec| {
        upsert_volume(
            spec,
            Volume {
                name: volume_name.clone(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret_name.clone()),
                    items: items.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        mount_on_all_containers(
            spec,
            &VolumeMount {
                name: volume_name.clone(),
                mount_path: mount_path.clone(),
                ..Default::default()
            },
        );
        Ok(())
    })
}

/// Modifier mounting a kubernetes config map as files. Key projection works
/// as in [`mount_secret`].
pub fn mount_configmap(
    configmap_name: impl Into<String>,
    mount_path: impl Into<String>,
    volume_name: impl Into<String>,
    items: Option<Vec<KeyToPath>>,
) -> PodModifier {
    let configmap_name = configmap_name.into();
    let mount_path = mount_path.into();
    let volume_name = volume_name.into();

    Box::new(move |spec| {
        upsert_volume(
            spec,
            Volume {
                name: volume_name.clone(),
                config_map: Some(ConfigMapVolumeSource {
                    name: configmap_name.clone(),
                    items: items.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        mount_on_all_containers(
            spec,
            &VolumeMount {
                name: volume_name.clone(),
                mount_path: mount_path.clone(),
                ..Default::default()
            },
        );
        Ok(())
    })
}

/// Modifier mounting a host path into every container.
pub fn mount_hostpath(
    host_path: impl Into<String>,
    mount_path: impl Into<String>,
    volume_name: impl Into<String>,
) -> PodModifier {
    let host_path = host_path.into();
    let mount_path = mount_path.into();
    let volume_name = volume_name.into();

    Box::new(move |spec| {
        upsert_volume(
            spec,
            Volume {
                name: volume_name.clone(),
                host_path: Some(HostPathVolumeSource {
                    path: host_path.clone(),
                    type_: None,
                }),
                ..Default::default()
            },
        );
        mount_on_all_containers(
            spec,
            &VolumeMount {
                name: volume_name.clone(),
                mount_path: mount_path.clone(),
                ..Default::default()
            },
        );
        Ok(())
    })
}

/// Modifier applying a set of environment variables to every container,
/// overwriting variables that already exist under the same name.
pub fn set_env_variables(env_vars: BTreeMap<String, String>) -> PodModifier {
    Box::new(move |spec| {
        for (name, value) in &env_vars {
            if name.is_empty() {
                return Err(MountError::InvalidSpec(
                    "environment variable names must not be empty".to_string(),
                ));
            }
            set_env_on_all_containers(spec, name, value);
        }
        Ok(())
    })
}

/// Choose a mount from parameters and the environment.
///
/// The volume is selected in this order:
/// - a PVC volume when both `pvc_name` and `volume_mount_path` are given
/// - a PVC volume when MLRUN_PVC_MOUNT is set to `<pvc-name>:<mount-path>`
/// - the v3io data fabric when its credential env vars are present, which
///   this adapter does not support
pub fn auto_mount(
    pvc_name: Option<&str>,
    volume_mount_path: Option<&str>,
    volume_name: Option<&str>,
) -> Result<PodModifier, MountError> {
    let volume_name = volume_name.unwrap_or("pipeline");

    if let (Some(pvc), Some(path)) = (pvc_name, volume_mount_path) {
        return Ok(mount_pvc(pvc, volume_name, path));
    }

    if let Ok(raw) = env::var(PVC_MOUNT_ENV_VAR) {
        let (pvc, path) = raw.split_once(':').ok_or_else(|| {
            MountError::InvalidSpec(format!(
                "{PVC_MOUNT_ENV_VAR} must look like <pvc-name>:<mount-path>, got \"{raw}\""
            ))
        })?;
        return Ok(mount_pvc(pvc, volume_name, path));
    }

    if env::var(V3IO_ACCESS_KEY_ENV_VAR).is_ok() && env::var(V3IO_USERNAME_ENV_VAR).is_ok() {
        return Err(MountError::NotSupported("v3io"));
    }

    Err(MountError::NoAutoMountAvailable)
}

/// Modifier copying local v3io credentials into the container.
pub fn v3io_cred(_api: &str, _user: &str, _access_key: &str) -> Result<PodModifier, MountError> {
    Err(MountError::NotSupported("v3io credential"))
}

/// Modifier volume-mounting a v3io path.
pub fn mount_v3io(
    _name: &str,
    _remote: &str,
    _access_key: &str,
    _user: &str,
    _secret: Option<&str>,
) -> Result<PodModifier, MountError> {
    Err(MountError::NotSupported("v3io"))
}

/// Modifier mounting the v3io daemon's config map.
pub fn mount_v3iod(_namespace: &str, _v3io_config_configmap: &str) -> Result<PodModifier, MountError> {
    Err(MountError::NotSupported("v3io daemon"))
}

/// Modifier adding s3 env vars or secrets to the container.
pub fn mount_s3(
    _secret_name: Option<&str>,
    _aws_access_key: &str,
    _aws_secret_key: &str,
    _endpoint_url: Option<&str>,
    _prefix: &str,
    _aws_region: Option<&str>,
    _non_anonymous: bool,
) -> Result<PodModifier, MountError> {
    Err(MountError::NotSupported("s3 credential"))
}

/// Modifier mounting the spark configuration.
pub fn mount_spark_conf() -> Result<PodModifier, MountError> {
    Err(MountError::NotSupported("spark conf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_container_spec() -> PodSpec {
        PodSpec {
            containers: vec![
                Container {
                    name: "main".to_string(),
                    ..Default::default()
                },
                Container {
                    name: "sidecar".to_string(),
                    ..Default::default()
                },
            ],
            init_containers: Some(vec![Container {
                name: "init".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn volume_names(spec: &PodSpec) -> Vec<&str> {
        spec.volumes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|v| v.name.as_str())
            .collect()
    }

    #[test]
    fn pvc_mount_reaches_every_container() {
        let mut spec = two_container_spec();
        mount_pvc("claim-1", "pipeline", "/mnt/pipeline")(&mut spec).unwrap();

        assert_eq!(volume_names(&spec), vec!["pipeline"]);
        let volume = &spec.volumes.as_ref().unwrap()[0];
        assert_eq!(
            volume
                .persistent_volume_claim
                .as_ref()
                .unwrap()
                .claim_name,
            "claim-1"
        );

        for container in spec
            .containers
            .iter()
            .chain(spec.init_containers.iter().flatten())
        {
            let mounts = container.volume_mounts.as_ref().unwrap();
            assert_eq!(mounts.len(), 1);
            assert_eq!(mounts[0].name, "pipeline");
            assert_eq!(mounts[0].mount_path, "/mnt/pipeline");
        }
    }

    #[test]
    fn reapplying_a_modifier_does_not_duplicate_the_volume() {
        let mut spec = two_container_spec();
        let modifier = mount_pvc("claim-1", "pipeline", "/mnt/pipeline");
        modifier(&mut spec).unwrap();

        // same volume name, new claim: definition is replaced
        mount_pvc("claim-2", "pipeline", "/mnt/pipeline")(&mut spec).unwrap();

        assert_eq!(volume_names(&spec), vec!["pipeline"]);
        assert_eq!(
            spec.volumes.as_ref().unwrap()[0]
                .persistent_volume_claim
                .as_ref()
                .unwrap()
                .claim_name,
            "claim-2"
        );
        assert_eq!(
            spec.containers[0].volume_mounts.as_ref().unwrap().len(),
            1
        );
    }

    #[test]
    fn secret_mount_projects_selected_keys() {
        let mut spec = two_container_spec();
        let items = vec![KeyToPath {
            key: "token".to_string(),
            path: "auth/token".to_string(),
            mode: None,
        }];
        mount_secret("creds", "/secrets", "secret", Some(items))(&mut spec).unwrap();

        let volume = &spec.volumes.as_ref().unwrap()[0];
        let secret = volume.secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("creds"));
        assert_eq!(secret.items.as_ref().unwrap()[0].path, "auth/token");
    }

    #[test]
    fn configmap_and_hostpath_mounts_attach_their_sources() {
        let mut spec = two_container_spec();
        mount_configmap("settings", "/etc/settings", "configmap", None)(&mut spec).unwrap();
        mount_hostpath("/var/data", "/data", "hostpath")(&mut spec).unwrap();

        assert_eq!(volume_names(&spec), vec!["configmap", "hostpath"]);
        assert_eq!(
            spec.containers[0].volume_mounts.as_ref().unwrap().len(),
            2
        );
    }

    #[test]
    fn env_variables_overwrite_existing_names() {
        let mut spec = two_container_spec();
        spec.containers[0].env = Some(vec![EnvVar {
            name: "MODE".to_string(),
            value: Some("old".to_string()),
            value_from: None,
        }]);

        let vars = BTreeMap::from([
            ("MODE".to_string(), "new".to_string()),
            ("EXTRA".to_string(), "1".to_string()),
        ]);
        set_env_variables(vars)(&mut spec).unwrap();

        let env = spec.containers[0].env.as_ref().unwrap();
        let mode = env.iter().find(|e| e.name == "MODE").unwrap();
        assert_eq!(mode.value.as_deref(), Some("new"));
        assert_eq!(env.len(), 2);

        // the init container got them too
        let init_env = spec.init_containers.as_ref().unwrap()[0].env.as_ref().unwrap();
        assert_eq!(init_env.len(), 2);
    }

    #[test]
    fn empty_env_names_are_rejected() {
        let mut spec = two_container_spec();
        let vars = BTreeMap::from([(String::new(), "x".to_string())]);
        assert!(matches!(
            set_env_variables(vars)(&mut spec),
            Err(MountError::InvalidSpec(_))
        ));
    }

    #[test]
    fn auto_mount_prefers_explicit_pvc_params() {
        let mut spec = two_container_spec();
        let modifier = auto_mount(Some("claim-1"), Some("/mnt/pipeline"), None).unwrap();
        modifier(&mut spec).unwrap();

        assert_eq!(volume_names(&spec), vec!["pipeline"]);
    }

    #[test]
    fn auto_mount_without_any_source_is_an_error() {
        // explicit params absent; the test environment defines neither
        // MLRUN_PVC_MOUNT nor v3io credentials
        if env::var(PVC_MOUNT_ENV_VAR).is_ok() || env::var(V3IO_ACCESS_KEY_ENV_VAR).is_ok() {
            return;
        }
        let err = match auto_mount(None, None, None) {
            Err(e) => e,
            Ok(_) => panic!("expected no auto-mount source to be available"),
        };
        assert_eq!(err, MountError::NoAutoMountAvailable);
    }

    #[test]
    fn unsupported_modifiers_say_so() {
        assert!(matches!(
            v3io_cred("", "user", "key"),
            Err(MountError::NotSupported(_))
        ));
        assert!(matches!(
            mount_v3io("v3io", "", "", "", None),
            Err(MountError::NotSupported(_))
        ));
        assert!(matches!(
            mount_v3iod("default", "v3io-config"),
            Err(MountError::NotSupported(_))
        ));
        assert!(matches!(
            mount_s3(Some("creds"), "", "", None, "", None, false),
            Err(MountError::NotSupported(_))
        ));
        assert!(matches!(mount_spark_conf(), Err(MountError::NotSupported(_))));
    }

    #[test]
    fn apply_all_runs_modifiers_in_order() {
        let mut spec = two_container_spec();
        let modifiers = vec![
            mount_pvc("claim-1", "pipeline", "/mnt/pipeline"),
            set_env_variables(BTreeMap::from([("MODE".to_string(), "x".to_string())])),
        ];
        apply_all(&mut spec, &modifiers).unwrap();

        assert_eq!(volume_names(&spec), vec!["pipeline"]);
        assert!(spec.containers[0].env.is_some());
    }
}
