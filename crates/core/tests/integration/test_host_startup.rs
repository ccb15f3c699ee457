//! Integration tests for host start-up: module discovery, tag conflicts,
//! configuration files and loader-backed model steps

use inferhost_core::data::Data;
use inferhost_core::steps::{ExtensionModule, StepDeclaration};
use inferhost_core::{
    loader_fn, Context, Error, ErrorKind, Host, HostConfig, InferenceMode, InferenceModel,
    PipelineStepConfig, PipelineStepRunner, Result, RunnerRegistry, StepConfigType,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::Builder;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResizeConfig {
    width: u32,
    height: u32,
}

impl StepConfigType for ResizeConfig {
    const TAG: &'static str = "resize";
}

/// Same tag, different module
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AudioResizeConfig {
    rate: u32,
}

impl StepConfigType for AudioResizeConfig {
    const TAG: &'static str = "resize";
}

struct ResizeRunner {
    config: ResizeConfig,
}

impl PipelineStepRunner for ResizeRunner {
    fn config(&self) -> &dyn PipelineStepConfig {
        &self.config
    }

    fn process(&self, data: Data, _ctx: &Context) -> Result<Data> {
        Ok(data.with("size", format!("{}x{}", self.config.width, self.config.height)))
    }
}

fn register_vision(registry: &RunnerRegistry) -> Result<()> {
    inferhost_core::register_step!(registry, ResizeConfig, |config: &ResizeConfig| {
        Ok(ResizeRunner {
            config: config.clone(),
        })
    })
}

fn register_nothing(_: &RunnerRegistry) -> Result<()> {
    Ok(())
}

fn register_failing(_: &RunnerRegistry) -> Result<()> {
    Err(Error::ConfigError("device unavailable".into()))
}

static VISION: ExtensionModule =
    ExtensionModule::new("vision", &[StepDeclaration::of::<ResizeConfig>], register_vision);

static AUDIO: ExtensionModule = ExtensionModule::new(
    "audio",
    &[StepDeclaration::of::<AudioResizeConfig>],
    register_nothing,
);

static FAILING: ExtensionModule = ExtensionModule::new("failing", &[], register_failing);

#[test]
fn test_explicit_module_only() {
    let host = Host::builder()
        .without_discovery()
        .module(&VISION)
        .start()
        .unwrap();
    assert_eq!(host.catalog().tags(), vec!["resize"]);
    assert!(!host.registry().contains("passthrough"));

    let pipeline = host
        .load_pipeline_json(r#"{"name": "thumb", "steps": [{"type": "resize", "width": 64, "height": 48}]}"#)
        .unwrap();
    let out = host.build(&pipeline).unwrap().exec(Data::new()).unwrap();
    assert_eq!(out.get_str("size").unwrap(), "64x48");
}

#[test]
fn test_module_listed_twice_counts_once() {
    let host = Host::builder()
        .without_discovery()
        .module(&VISION)
        .module(&VISION)
        .start()
        .unwrap();
    assert_eq!(host.catalog().modules(), vec!["vision"]);
}

#[test]
fn test_other_module_under_same_name_is_fatal() {
    static SECOND_VISION: ExtensionModule = ExtensionModule::new(
        "vision",
        &[StepDeclaration::of::<AudioResizeConfig>],
        register_nothing,
    );
    let err = Host::builder()
        .without_discovery()
        .module(&VISION)
        .module(&SECOND_VISION)
        .start()
        .unwrap_err();
    assert!(matches!(&err, Error::DuplicateModule(name) if name == "vision"));
    assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
}

#[test]
fn test_duplicate_tag_across_modules_is_fatal() {
    let err = Host::builder()
        .module(&VISION)
        .module(&AUDIO)
        .start()
        .unwrap_err();
    match &err {
        Error::DuplicateTypeTag { tag, first, second } => {
            assert_eq!(tag, "resize");
            assert_eq!((first.as_str(), second.as_str()), ("audio", "vision"));
        }
        other => panic!("expected DuplicateTypeTag, got {:?}", other),
    }
    assert_eq!(err.kind(), ErrorKind::DuplicateRegistration);
}

#[test]
fn test_failing_hook_aborts_start() {
    let err = Host::builder().module(&FAILING).start().unwrap_err();
    assert!(matches!(err, Error::Initialization(ref msg) if msg.contains("failing")));
}

#[test]
fn test_explicit_factory_conflicting_with_module() {
    let err = Host::builder()
        .without_discovery()
        .module(&VISION)
        .factory("resize", |_: &dyn PipelineStepConfig| -> Result<Box<dyn PipelineStepRunner>> {
            Err(Error::Internal("never built".into()))
        })
        .start()
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateRegistration { .. }));
}

/// Sums the `values` list into `total`
struct Summer;

impl InferenceModel for Summer {
    type Input = Data;
    type Output = Data;

    fn model_id(&self) -> &str {
        "summer"
    }

    fn infer(&self, batch: Vec<Data>) -> anyhow::Result<Vec<Data>> {
        batch
            .into_iter()
            .map(|data| -> anyhow::Result<Data> {
                let total: i64 = data
                    .get_list("values")?
                    .iter()
                    .filter_map(|v| v.as_int())
                    .sum();
                Ok(Data::single("total", total))
            })
            .collect()
    }
}

fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_files_in_every_format() {
    let toml = write_temp(
        ".toml",
        "log_filter = \"debug\"\n\n[executioner]\nworkers = 2\ninference_mode = \"BATCHED\"\n",
    );
    let yaml = write_temp(
        ".yaml",
        "log_filter: debug\nexecutioner:\n  workers: 2\n  inference_mode: BATCHED\n",
    );
    let json = write_temp(
        ".json",
        r#"{"log_filter": "debug", "executioner": {"workers": 2, "inference_mode": "BATCHED"}}"#,
    );

    let configs: Vec<HostConfig> = [&toml, &yaml, &json]
        .iter()
        .map(|file| HostConfig::from_file(file.path()).unwrap())
        .collect();
    for config in &configs {
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.executioner.workers, 2);
        assert_eq!(config.executioner.inference_mode, InferenceMode::Batched);
        // unset fields keep their defaults
        assert_eq!(config.executioner.queue_limit, 64);
    }
}

#[test]
fn test_invalid_config_file_rejected() {
    let zero = write_temp(".toml", "[executioner]\nqueue_limit = 0\n");
    assert!(matches!(HostConfig::from_file(zero.path()), Err(Error::ConfigError(_))));

    let unknown = write_temp(".yaml", "executioner:\n  threads: 4\n");
    assert!(matches!(HostConfig::from_file(unknown.path()), Err(Error::ConfigError(_))));
}

#[test]
fn test_model_pipeline_from_file() {
    let config = HostConfig::from_file(
        write_temp(".toml", "[executioner]\nworkers = 2\n").path(),
    )
    .unwrap();
    let host = Host::builder()
        .config(config)
        .model_loader(loader_fn(|source: &str| -> anyhow::Result<Summer> {
            anyhow::ensure!(source == "mem://summer", "no model at {}", source);
            Ok(Summer)
        }))
        .start()
        .unwrap();

    let pipeline_file = write_temp(
        ".yml",
        "name: sum\nsteps:\n  - type: model\n    model_uri: mem://summer\n    input_names: [values]\n  - type: select_keys\n    keys: [total]\n",
    );
    let pipeline = host.load_pipeline_file(pipeline_file.path()).unwrap();
    let executor = host.build(&pipeline).unwrap();

    let input = Data::single(
        "values",
        inferhost_core::Value::list(vec![1i64.into(), 2i64.into(), 39i64.into()]).unwrap(),
    );
    let out = executor.exec(input).unwrap();
    assert_eq!(out.get_int("total").unwrap(), 42);
    executor.close().unwrap();
}

#[test]
fn test_model_load_failure_fails_build() {
    let host = Host::builder()
        .model_loader(loader_fn(|source: &str| -> anyhow::Result<Summer> {
            anyhow::bail!("no model at {}", source)
        }))
        .start()
        .unwrap();
    let pipeline = host
        .load_pipeline_json(r#"{"steps": [{"type": "model", "model_uri": "mem://missing"}]}"#)
        .unwrap();
    let err = host.build(&pipeline).unwrap_err();
    assert!(matches!(err, Error::Initialization(ref msg) if msg.contains("mem://missing")));
}

#[test]
fn test_unknown_step_in_document() {
    let host = Host::builder().start().unwrap();
    let err = host
        .load_pipeline_json(r#"{"steps": [{"type": "teleport"}]}"#)
        .unwrap_err();
    assert!(matches!(err, Error::UnresolvedType(ref tag) if tag == "teleport"));

    let err = host
        .load_pipeline_json(r#"{"steps": [{"keys": ["a"]}]}"#)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPipeline(_)));
}
