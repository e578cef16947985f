use std::sync::Arc;

use cellspace_common::{CellId, MaterialId, UniverseId};
use cellspace_kernel::{
    CellSpec, Geometry, GeometryBuilder, GeometryConfig, LatticeSpec, MeshQuery,
};
use cellspace_surface::SurfaceEntry;
use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{Format, LoadError};

/// A complete geometry definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeometryDefinition {
    #[serde(default)]
    pub settings: GeometryConfig,
    #[serde(default)]
    pub surfaces: Vec<SurfaceEntry>,
    pub cells: Vec<CellDef>,
    #[serde(default)]
    pub lattices: Vec<LatticeDef>,
}

/// One cell as written in a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellDef {
    pub id: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub universe: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_region: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<i32>,
    /// Temperatures in K.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temperature: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
    /// Angles about x, y and z in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 3]>,
}

/// Universes placed in a lattice's elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatticeDef {
    pub id: i32,
    pub universes: Vec<i32>,
}

/// A single material id, or whitespace-separated ids and `void`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaterialField {
    Id(i32),
    List(String),
}

impl MaterialField {
    /// Materials per instance, `None` being void.
    pub fn parse(&self, cell: CellId) -> Result<Vec<Option<MaterialId>>, LoadError> {
        match self {
            MaterialField::Id(id) => Ok(vec![Some(MaterialId(*id))]),
            MaterialField::List(text) => {
                let materials = text
                    .split_whitespace()
                    .map(|token| {
                        if token.eq_ignore_ascii_case("void") {
                            Ok(None)
                        } else {
                            token.parse().map(|id| Some(MaterialId(id))).map_err(|_| {
                                LoadError::InvalidMaterial {
                                    cell,
                                    token: token.to_owned(),
                                }
                            })
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if materials.is_empty() {
                    return Err(LoadError::InvalidMaterial {
                        cell,
                        token: text.clone(),
                    });
                }
                Ok(materials)
            }
        }
    }
}

impl GeometryDefinition {
    pub fn parse(text: &str, format: Format) -> Result<Self, LoadError> {
        Ok(match format {
            Format::Yaml => serde_yaml::from_str(text)?,
            Format::Json => serde_json::from_str(text)?,
        })
    }

    pub fn to_yaml(&self) -> Result<String, LoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Build the geometry. Mesh cells need [`build_with_mesh`](Self::build_with_mesh).
    pub fn build(self) -> Result<Geometry, LoadError> {
        Ok(self.into_builder()?.build()?)
    }

    pub fn build_with_mesh(self, backend: Arc<dyn MeshQuery>) -> Result<Geometry, LoadError> {
        let mut builder = self.into_builder()?;
        builder.mesh_backend(backend);
        Ok(builder.build()?)
    }

    fn into_builder(self) -> Result<GeometryBuilder, LoadError> {
        let mut builder = GeometryBuilder::with_config(self.settings);
        for entry in self.surfaces {
            builder.surface(entry.id.0, entry.surface)?;
        }
        for cell in self.cells {
            builder.cell(cell.into_spec()?);
        }
        for lattice in self.lattices {
            builder.lattice(LatticeSpec::new(lattice.id, lattice.universes));
        }
        Ok(builder)
    }
}

impl CellDef {
    fn into_spec(self) -> Result<CellSpec, LoadError> {
        let id = CellId(self.id);
        let materials = match &self.material {
            Some(field) => field.parse(id)?,
            None => Vec::new(),
        };
        Ok(CellSpec {
            id,
            name: self.name,
            universe: UniverseId(self.universe),
            region: self.region,
            mesh_region: self.mesh_region,
            materials,
            fill: self.fill,
            temperatures: self.temperature,
            translation: self.translation.map(DVec3::from_array),
            rotation: self.rotation,
        })
    }
}
