use dcr_types::Qualifier;

use crate::model::ResourceType;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Registration {
    qualifier: Qualifier,
    type_iri: String,
    resource_type: ResourceType,
    priority: u32,
}

/// Maps `(qualifier, rdf:type IRI)` to the kind of object to materialize.
///
/// When a graph asserts several registered types, the registration with
/// the lowest priority value wins. The default registry covers every
/// [`ResourceType`] under each of its qualifiers; further IRIs may be
/// registered as aliases.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    entries: Vec<Registration>,
}

impl TypeRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn register(
        &mut self,
        qualifier: Qualifier,
        type_iri: impl Into<String>,
        resource_type: ResourceType,
        priority: u32,
    ) {
        let type_iri = type_iri.into();
        self.entries
            .retain(|e| !(e.qualifier == qualifier && e.type_iri == type_iri));
        let at = self
            .entries
            .partition_point(|e| e.priority <= priority);
        self.entries.insert(
            at,
            Registration {
                qualifier,
                type_iri,
                resource_type,
                priority,
            },
        );
    }

    /// Pick the kind for a node under `qualifier` declaring `types`.
    ///
    /// Returns the matched IRI alongside the kind.
    pub fn resolve(&self, qualifier: Qualifier, types: &[String]) -> Option<(ResourceType, &str)> {
        self.entries
            .iter()
            .filter(|e| e.qualifier == qualifier)
            .find(|e| types.iter().any(|t| *t == e.type_iri))
            .map(|e| (e.resource_type, e.type_iri.as_str()))
    }

    /// IRIs recognized under `qualifier`, in priority order.
    pub fn expected_types(&self, qualifier: Qualifier) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.qualifier == qualifier)
            .map(|e| e.type_iri.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for resource_type in ResourceType::ALL {
            for qualifier in resource_type.qualifiers() {
                registry.register(
                    *qualifier,
                    resource_type.type_iri(),
                    resource_type,
                    resource_type.priority(),
                );
            }
        }
        registry
    }
}
