//! Model factory: resolve a domain specifier into a compiled model

use std::fs;
use std::path::Path;

use super::{CompilationMode, CompiledModel, Domain, Dynamics, Hvac, Navigation, Reservoir};
use crate::error::{Error, Result};

const REGISTRY_EXAMPLES: &str = "Navigation-v1|v2|v3, Reservoir-<n>, HVAC-<n>";

/// Load and compile the domain named by `spec`.
///
/// `spec` is either the path of a JSON instance file or a registry id.
pub fn make(spec: &str, mode: CompilationMode) -> Result<CompiledModel> {
    let path = Path::new(spec);
    let domain = if path.is_file() {
        from_instance_file(path)?
    } else {
        from_registry(spec)?
    };
    domain.validate()?;

    tracing::debug!(domain = %domain.name(), ?mode, "compiled model");
    Ok(CompiledModel::new(domain, mode))
}

/// Resolve a registry id such as `Navigation-v2`, `Reservoir-8` or `HVAC-3`.
pub fn from_registry(id: &str) -> Result<Domain> {
    let unknown = || Error::UnknownDomain {
        id: id.to_string(),
        expected: REGISTRY_EXAMPLES.to_string(),
    };

    let (name, variant) = id.trim().split_once('-').ok_or_else(unknown)?;
    match name.to_ascii_lowercase().as_str() {
        "navigation" => match variant.to_ascii_lowercase().as_str() {
            "v1" => Ok(Domain::Navigation(Navigation::v1())),
            "v2" => Ok(Domain::Navigation(Navigation::v2())),
            "v3" => Ok(Domain::Navigation(Navigation::v3())),
            _ => Err(unknown()),
        },
        "reservoir" => {
            let reservoirs = parse_count(variant).ok_or_else(unknown)?;
            Ok(Domain::Reservoir(Reservoir::with_reservoirs(reservoirs)))
        }
        "hvac" => {
            let rooms = parse_count(variant).ok_or_else(unknown)?;
            Ok(Domain::Hvac(Hvac::with_rooms(rooms)))
        }
        _ => Err(unknown()),
    }
}

/// Read a JSON instance file, e.g. `{"domain": "reservoir", "reservoirs": 4}`.
/// Parameters left out take the domain defaults.
pub fn from_instance_file(path: &Path) -> Result<Domain> {
    let contents = fs::read_to_string(path).map_err(|source| Error::InstanceIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| Error::InstanceFormat {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_count(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|&n| n > 0)
}
