//! Model lookup: mapping model URIs to instantiable models.
//!
//! A *model* is a blueprint from which slaves can be instantiated. Where
//! models come from (FMU importers, remote proxies, ...) is a backend
//! concern; this module defines the capability traits and the composite
//! resolver that routes a URI to the first registered sub-resolver that
//! claims it.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use lockstep_core::slave::Slave;
use lockstep_types::ModelDescription;
use tracing::debug;

use crate::uri::{resolve_reference, Uri};

/// A model, i.e. a blueprint from which slaves can be instantiated.
pub trait Model: Send + Sync {
    /// Returns a description of this model.
    fn description(&self) -> Arc<ModelDescription>;

    /// Instantiates a slave under the given instance name.
    fn instantiate(&self, name: &str) -> Result<Box<dyn Slave>>;
}

/// A resolver for model URIs of one or more specific schemes.
///
/// Client code normally does not use this directly, but registers it as
/// one of several sub-resolvers in a [`ModelUriResolver`].
pub trait ModelUriSubResolver: Send + Sync {
    /// Tries to resolve an absolute model URI.
    ///
    /// Returns `None` when this resolver is not designed to handle such
    /// URIs, and an error when it would normally handle the URI but the
    /// resolution failed (e.g. an I/O error).
    fn lookup_model(&self, model_uri: &Uri) -> Result<Option<Arc<dyn Model>>>;

    /// Tries to resolve a model URI reference relative to a base URI.
    ///
    /// The default implementation resolves the reference per RFC 3986 and
    /// forwards to [`ModelUriSubResolver::lookup_model`]; sub-resolvers may
    /// override it to apply non-standard resolution mechanisms.
    fn lookup_model_relative(
        &self,
        base_uri: &Uri,
        model_uri_reference: &Uri,
    ) -> Result<Option<Arc<dyn Model>>> {
        let resolved = resolve_reference(base_uri, model_uri_reference)
            .context("could not resolve model URI reference")?;
        self.lookup_model(&resolved)
    }
}

/// A sub-resolver built from a scheme name and a lookup closure, mainly
/// useful for tests and simple in-process backends.
pub struct SchemeSubResolver<F> {
    scheme: String,
    lookup: F,
}

impl<F> SchemeSubResolver<F>
where
    F: Fn(&Uri) -> Result<Arc<dyn Model>> + Send + Sync,
{
    /// Creates a sub-resolver that claims every URI with the given scheme
    /// and resolves it with `lookup`.
    pub fn new(scheme: impl Into<String>, lookup: F) -> Self {
        SchemeSubResolver {
            scheme: scheme.into(),
            lookup,
        }
    }
}

impl<F> ModelUriSubResolver for SchemeSubResolver<F>
where
    F: Fn(&Uri) -> Result<Arc<dyn Model>> + Send + Sync,
{
    fn lookup_model(&self, model_uri: &Uri) -> Result<Option<Arc<dyn Model>>> {
        if model_uri.scheme() != Some(self.scheme.as_str()) {
            return Ok(None);
        }
        (self.lookup)(model_uri).map(Some)
    }
}

/// A generic model URI resolver, grouping resolvers for multiple schemes.
///
/// Sub-resolvers are consulted in registration order; the first one that
/// claims a URI handles it.
#[derive(Default)]
pub struct ModelUriResolver {
    sub_resolvers: Vec<Arc<dyn ModelUriSubResolver>>,
}

impl ModelUriResolver {
    /// Constructs an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sub-resolver to the chain.
    pub fn add_sub_resolver(&mut self, sub_resolver: Arc<dyn ModelUriSubResolver>) {
        self.sub_resolvers.push(sub_resolver);
    }

    /// Resolves an absolute model URI.
    pub fn lookup_model(&self, model_uri: &Uri) -> Result<Arc<dyn Model>> {
        if !model_uri.is_absolute() {
            bail!("model URI '{model_uri}' is not absolute");
        }
        for sub_resolver in &self.sub_resolvers {
            if let Some(model) = sub_resolver.lookup_model(model_uri)? {
                debug!(%model_uri, "resolved model URI");
                return Ok(model);
            }
        }
        bail!("no resolver available for URI '{model_uri}'")
    }

    /// Resolves a model URI reference relative to a base URI.
    pub fn lookup_model_relative(
        &self,
        base_uri: &Uri,
        model_uri_reference: &Uri,
    ) -> Result<Arc<dyn Model>> {
        for sub_resolver in &self.sub_resolvers {
            if let Some(model) =
                sub_resolver.lookup_model_relative(base_uri, model_uri_reference)?
            {
                return Ok(model);
            }
        }
        bail!("no resolver available for URI reference '{model_uri_reference}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::slave::StepResult;
    use lockstep_types::{
        Duration, ModelCapabilities, Result as CoreResult, TimePoint, ValueReference,
    };

    struct NullSlave;

    impl Slave for NullSlave {
        fn model_description(&self) -> ModelDescription {
            ModelDescription {
                name: "null".to_string(),
                uuid: String::new(),
                description: String::new(),
                author: String::new(),
                version: String::new(),
                variables: Vec::new(),
                capabilities: ModelCapabilities::default(),
            }
        }
        fn setup(
            &mut self,
            _start: TimePoint,
            _stop: Option<TimePoint>,
            _tolerance: Option<f64>,
        ) -> CoreResult<()> {
            Ok(())
        }
        fn start_simulation(&mut self) -> CoreResult<()> {
            Ok(())
        }
        fn end_simulation(&mut self) -> CoreResult<()> {
            Ok(())
        }
        fn do_step(&mut self, _t: TimePoint, _dt: Duration) -> CoreResult<StepResult> {
            Ok(StepResult::Complete)
        }
        fn get_real_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &mut [f64],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn get_integer_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &mut [i32],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn get_boolean_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &mut [bool],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn get_string_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &mut [String],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn set_real_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &[f64],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn set_integer_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &[i32],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn set_boolean_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &[bool],
        ) -> CoreResult<()> {
            Ok(())
        }
        fn set_string_variables(
            &mut self,
            _vars: &[ValueReference],
            _values: &[String],
        ) -> CoreResult<()> {
            Ok(())
        }
    }

    struct NullModel;

    impl Model for NullModel {
        fn description(&self) -> Arc<ModelDescription> {
            Arc::new(NullSlave.model_description())
        }
        fn instantiate(&self, _name: &str) -> Result<Box<dyn Slave>> {
            Ok(Box::new(NullSlave))
        }
    }

    #[test]
    fn test_first_claiming_sub_resolver_wins() {
        let mut resolver = ModelUriResolver::new();
        resolver.add_sub_resolver(Arc::new(SchemeSubResolver::new("mock", |_uri: &Uri| {
            Ok(Arc::new(NullModel) as Arc<dyn Model>)
        })));
        resolver.add_sub_resolver(Arc::new(SchemeSubResolver::new("mock", |_uri: &Uri| {
            bail!("the second resolver must never be consulted")
        })));

        let model = resolver
            .lookup_model(&Uri::parse("mock:///some/model").unwrap())
            .unwrap();
        assert_eq!(model.description().name, "null");
        assert!(model.instantiate("instance").is_ok());
    }

    #[test]
    fn test_unclaimed_scheme_is_an_error() {
        let mut resolver = ModelUriResolver::new();
        resolver.add_sub_resolver(Arc::new(SchemeSubResolver::new("mock", |_uri: &Uri| {
            Ok(Arc::new(NullModel) as Arc<dyn Model>)
        })));
        assert!(resolver
            .lookup_model(&Uri::parse("ftp://example.com/model").unwrap())
            .is_err());
        assert!(resolver
            .lookup_model(&Uri::parse("relative/reference").unwrap())
            .is_err());
    }

    #[test]
    fn test_relative_lookup_resolves_against_base() {
        let mut resolver = ModelUriResolver::new();
        resolver.add_sub_resolver(Arc::new(SchemeSubResolver::new("mock", |uri: &Uri| {
            if uri.path() == "/models/engine" {
                Ok(Arc::new(NullModel) as Arc<dyn Model>)
            } else {
                bail!("unexpected path '{}'", uri.path())
            }
        })));
        let base = Uri::parse("mock://host/models/system").unwrap();
        let reference = Uri::parse("engine").unwrap();
        assert!(resolver.lookup_model_relative(&base, &reference).is_ok());
    }
}
