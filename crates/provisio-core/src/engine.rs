use crate::concurrency::shutdown_requested;
use crate::config::Binaries;
use crate::credentials::{self, CredentialPaths};
use crate::labels;
use crate::resolver::{GitCli, ModuleLocation, ModuleRequest, ModuleResolver, SourceFetcher};
use crate::source::ManifestSource;
use crate::stackinput::StackInput;
use crate::CoreError;
use provisio_runtime::{
    execute, select_provisioner, EngineInput, EngineOutput, IoMode, Operation, ProvisionerKind,
    RunOptions, RuntimeError,
};
use provisio_schema::{
    apply_defaults, overrides, project, tfvars, validate, variables_document, KindCatalog,
    Manifest, ManifestFile, Override, ResourceKind, ScopeKey, StackFqdn,
};
use provisio_store::WorkspaceLayout;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Copy of the engine input kept in the workspace for inspection.
const STACK_INPUT_FILE: &str = "stack-input.yaml";
const TFVARS_COPY_FILE: &str = "provisio.tfvars";

/// The provisioning pipeline: manifest in, engine run out.
///
/// Holds everything that is fixed for one CLI invocation: the kind catalog,
/// the home layout, the binaries to shell out to, and the module source.
pub struct Engine {
    catalog: KindCatalog,
    layout: WorkspaceLayout,
    binaries: Binaries,
    module_repo: Option<String>,
    fetcher: Box<dyn SourceFetcher>,
}

pub struct ManifestRequest {
    pub source: ManifestSource,
    pub overrides: Vec<Override>,
}

/// A manifest after overrides, defaults and validation.
#[derive(Debug)]
pub struct PreparedManifest {
    pub manifest: Manifest,
    pub kind: ResourceKind,
    pub source: ManifestSource,
    /// File the manifest was read from; a temp copy when overrides applied.
    pub file: ManifestFile,
    pub defaults_applied: usize,
}

impl PreparedManifest {
    pub fn name(&self) -> Option<&str> {
        self.manifest.name()
    }
}

#[derive(Debug, Clone)]
pub struct RunSpec {
    pub operation: Operation,
    /// Pulumi stack FQDN; beats the manifest's stack labels.
    pub stack: Option<String>,
    pub module_dir: Option<PathBuf>,
    pub module_version: Option<String>,
    pub credentials: CredentialPaths,
    pub auto_approve: bool,
    pub force: bool,
    pub destroy_plan: bool,
    pub diff: bool,
    pub io_mode: IoMode,
    pub no_cleanup: bool,
}

impl RunSpec {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            stack: None,
            module_dir: None,
            module_version: None,
            credentials: CredentialPaths::default(),
            auto_approve: false,
            force: false,
            destroy_plan: false,
            diff: false,
            io_mode: IoMode::default(),
            no_cleanup: false,
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub provisioner: ProvisionerKind,
    pub scope: ScopeKey,
    pub module: ModuleLocation,
    /// Set when the workspace was kept with `no_cleanup`.
    pub workspace: Option<PathBuf>,
    pub output: EngineOutput,
}

/// Built-in kinds plus an optional catalog file merged over them.
pub fn load_catalog(extra: Option<&Path>) -> Result<KindCatalog, CoreError> {
    let mut catalog = KindCatalog::builtin()?;
    if let Some(path) = extra {
        debug!("merging catalog {}", path.display());
        catalog.merge(KindCatalog::from_file(path)?)?;
    }
    Ok(catalog)
}

impl Engine {
    pub fn new(
        catalog: KindCatalog,
        layout: WorkspaceLayout,
        binaries: Binaries,
        module_repo: Option<String>,
    ) -> Self {
        let fetcher = Box::new(GitCli::new(binaries.git.clone()));
        Self {
            catalog,
            layout,
            binaries,
            module_repo,
            fetcher,
        }
    }

    /// Replace the `git` fetcher, e.g. with a test double.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Box<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    #[inline]
    pub fn catalog(&self) -> &KindCatalog {
        &self.catalog
    }

    #[inline]
    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    #[inline]
    pub fn binaries(&self) -> &Binaries {
        &self.binaries
    }

    pub fn module_repo(&self) -> Option<&str> {
        self.module_repo.as_deref()
    }

    /// Load a manifest, apply overrides and schema defaults, and validate.
    ///
    /// Overrides are applied to a temp copy; the source file is never
    /// written.
    pub fn prepare(&self, request: ManifestRequest) -> Result<PreparedManifest, CoreError> {
        let tmp_dir = self.layout.tmp_dir();
        let materialized = request
            .source
            .materialize(&self.binaries.kustomize, &tmp_dir)?;
        let file = if request.overrides.is_empty() {
            materialized
        } else {
            overrides::apply(
                materialized.path(),
                &request.overrides,
                &self.catalog,
                &tmp_dir,
            )?
        };

        let mut manifest = Manifest::from_file(file.path())?;
        let kind = manifest.resource_kind(&self.catalog)?.clone();
        let schema = self.catalog.schema();
        let defaults_applied = apply_defaults(&mut manifest, &kind, schema)?;
        validate(&manifest, &kind, schema)?;
        debug!(
            "prepared {} manifest {}",
            kind.kind,
            manifest.name().unwrap_or("<unnamed>")
        );

        Ok(PreparedManifest {
            manifest,
            kind,
            source: request.source,
            file,
            defaults_applied,
        })
    }

    /// Engine chosen by `flag`, else by the provisioner label. `None` means
    /// the caller has to ask.
    pub fn provisioner_kind(
        &self,
        prepared: &PreparedManifest,
        flag: Option<ProvisionerKind>,
    ) -> Result<Option<ProvisionerKind>, CoreError> {
        if flag.is_some() {
            return Ok(flag);
        }
        Ok(labels::provisioner(&prepared.manifest.labels())?)
    }

    pub fn variables(&self, kind: &ResourceKind) -> Result<String, CoreError> {
        Ok(variables_document(kind, self.catalog.schema())?)
    }

    pub fn tfvars(&self, prepared: &PreparedManifest) -> Result<String, CoreError> {
        let tree = project(&prepared.manifest, &prepared.kind, self.catalog.schema());
        Ok(tfvars::render(&tree)?)
    }

    pub fn stack_input(
        &self,
        prepared: &PreparedManifest,
        credentials: &CredentialPaths,
    ) -> Result<StackInput, CoreError> {
        let tree = project(&prepared.manifest, &prepared.kind, self.catalog.schema());
        Ok(credentials::compose(StackInput::new(tree), credentials)?)
    }

    /// Drive `kind`'s engine through `spec.operation` for a prepared
    /// manifest.
    pub fn run(
        &self,
        prepared: &PreparedManifest,
        kind: ProvisionerKind,
        spec: &RunSpec,
    ) -> Result<RunOutcome, CoreError> {
        let provisioner = select_provisioner(kind, Some(self.binaries.engine(kind)));
        if !provisioner.supports(spec.operation) {
            return Err(RuntimeError::UnsupportedOperation {
                engine: provisioner.name().to_owned(),
                operation: spec.operation.as_str().to_owned(),
            }
            .into());
        }

        let manifest_labels = prepared.manifest.labels();
        let stack = if kind.is_declarative() {
            None
        } else {
            Some(self.stack_fqdn(spec.stack.as_deref(), &manifest_labels)?)
        };
        let scope = scope_key(prepared, stack.as_ref());

        let mut credential_paths = spec.credentials.clone();
        if let Some(dir) = prepared.source.input_dir() {
            credential_paths.discover(dir);
        }
        let provider_credentials = credentials::load(&credential_paths)?;
        let backend_config = if kind.is_declarative() {
            labels::backend(&manifest_labels)?
                .map(|b| b.init_args())
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        self.layout.initialize()?;
        let mut workspace = self
            .layout
            .workspace_dir(kind.home_namespace(), scope.as_str())?;

        let tree = project(&prepared.manifest, &prepared.kind, self.catalog.schema());
        let (input, env) = if kind.is_declarative() {
            let rendered = tfvars::render(&tree)?;
            std::fs::write(workspace.join(TFVARS_COPY_FILE), &rendered)?;
            let env = credentials::engine_env(&provider_credentials, workspace.path())?;
            (EngineInput::Tfvars(rendered), env)
        } else {
            let stack_input = credentials::merge(StackInput::new(tree), provider_credentials);
            let rendered = stack_input.to_yaml()?;
            provisio_store::write_private(&workspace.join(STACK_INPUT_FILE), rendered.as_bytes())?;
            (EngineInput::StackInput(rendered), Vec::new())
        };

        let resolver = ModuleResolver::new(
            &self.catalog,
            &self.layout,
            self.fetcher.as_ref(),
            self.module_repo.as_deref(),
        );
        let module = resolver.resolve(
            provisioner.as_ref(),
            &ModuleRequest {
                module_dir_hint: spec.module_dir.as_deref(),
                scope: &scope,
                kind: &prepared.kind.kind,
                version_ref: spec.module_version.as_deref(),
            },
        )?;

        if spec.no_cleanup {
            info!("keeping workspace {}", workspace.retain().display());
        }
        if shutdown_requested() {
            return Err(CoreError::Interrupted);
        }

        let options = RunOptions {
            stack: stack.map(StackFqdn::into_inner),
            auto_approve: spec.auto_approve,
            force: spec.force,
            destroy_plan: spec.destroy_plan,
            diff: spec.diff,
            io_mode: spec.io_mode,
            backend_config,
            env,
        };
        info!(
            "{} {} for {} in {}",
            provisioner.name(),
            spec.operation,
            scope,
            module.path.display()
        );
        let output = execute(
            provisioner.as_ref(),
            &module.path,
            spec.operation,
            &input,
            &options,
        )?;

        Ok(RunOutcome {
            provisioner: kind,
            scope,
            module,
            workspace: workspace
                .is_retained()
                .then(|| workspace.path().to_path_buf()),
            output,
        })
    }

    fn stack_fqdn(
        &self,
        flag: Option<&str>,
        manifest_labels: &labels::Labels,
    ) -> Result<StackFqdn, CoreError> {
        if let Some(stack) = flag.map(str::trim).filter(|s| !s.is_empty()) {
            return Ok(StackFqdn::new(stack));
        }
        labels::stack_fqdn(manifest_labels)?.ok_or_else(|| RuntimeError::MissingStack.into())
    }
}

/// Pulumi runs are scoped by stack, declarative runs by kind and name.
fn scope_key(prepared: &PreparedManifest, stack: Option<&StackFqdn>) -> ScopeKey {
    match stack {
        Some(fqdn) => ScopeKey::new(fqdn.as_str()),
        None => match prepared.name() {
            Some(name) => ScopeKey::new(format!("{}-{name}", prepared.kind.kind)),
            None => ScopeKey::new(prepared.kind.kind.as_str()),
        },
    }
}
