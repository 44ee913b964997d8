//! The render state machine.
//!
//! One mutable visualization state plus pure transition rules per command
//! kind. Applying a command to a state is a total, deterministic function:
//! the same command against the same state always yields the same next state
//! (or the same typed error with the state untouched), independent of wall
//! clock. The executor owns the only live instance and applies commands one
//! at a time.

use molv_protocol::{Command, Selection, StyleKind, StyleParams, Vec3};

use crate::error::{Error, Result};

/// Canonical camera distance restored by `load_pdb` and `reset_view`.
pub const CANONICAL_DISTANCE: f64 = 100.0;

const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Camera orientation (row-major rotation matrix) and distance to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub orientation: [[f64; 3]; 3],
    pub distance: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            orientation: IDENTITY,
            distance: CANONICAL_DISTANCE,
        }
    }
}

impl Camera {
    /// Compose a rotation about one axis into the current orientation.
    /// The new rotation is applied after whatever is already accumulated.
    fn rotate(&mut self, axis: Axis, degrees: f64) {
        self.orientation = mat_mul(axis_rotation(axis, degrees), self.orientation);
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
    Z,
}

fn axis_rotation(axis: Axis, degrees: f64) -> [[f64; 3]; 3] {
    let radians = degrees.to_radians();
    let (s, c) = radians.sin_cos();
    match axis {
        Axis::X => [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]],
        Axis::Y => [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
        Axis::Z => [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
    }
}

fn mat_mul(a: [[f64; 3]; 3], b: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// A wireframe box shape; at most one is active at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxRegion {
    pub center: Vec3,
    pub size: Vec3,
}

/// One surface entry, scoped to a selection or the whole structure.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceEntry {
    pub selection: Option<Selection>,
}

/// One style rule. Rules for the same selection overwrite; otherwise they
/// accumulate in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selection: Selection,
    pub kind: StyleKind,
    pub params: Option<StyleParams>,
}

/// Summary of a loaded structure, as produced by a [`StructureSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub id: String,
    pub atom_count: usize,
    pub hetero_atoms: usize,
}

/// Seam for structure retrieval. Real PDB fetch/parse lives behind this
/// trait; the bridge only cares whether it produced a structure or failed.
pub trait StructureSource: Send + Sync {
    fn fetch(&self, id: &str) -> std::result::Result<Structure, String>;
}

/// Deterministic built-in source: derives a synthetic atom census from the
/// identifier so replays are reproducible without touching the network.
#[derive(Debug, Default)]
pub struct SyntheticStructures;

impl StructureSource for SyntheticStructures {
    fn fetch(&self, id: &str) -> std::result::Result<Structure, String> {
        let seed = fnv1a(id.as_bytes());
        Ok(Structure {
            id: id.to_string(),
            atom_count: 300 + (seed % 700) as usize,
            hetero_atoms: (seed >> 8) as usize % 32,
        })
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Is `id` a syntactically valid PDB identifier (four alphanumerics, leading
/// digit 1-9)?
pub fn is_valid_pdb_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 4
        && matches!(bytes[0], b'1'..=b'9')
        && bytes.iter().all(|b| b.is_ascii_alphanumeric())
}

/// Validate a command's arguments without reference to any state.
///
/// The dispatcher runs this before a command ever leaves the process, so an
/// invalid argument shape fails fast as a protocol error instead of costing
/// a round trip; the executor runs it again as part of [`RenderState::apply`].
pub fn validate_args(command: &Command) -> Result<()> {
    match command {
        Command::LoadPdb { pdb_id } => {
            if !is_valid_pdb_id(pdb_id) {
                return Err(Error::Protocol(format!(
                    "invalid PDB identifier: {pdb_id:?}"
                )));
            }
        }
        Command::Rotate { x, y, z } => {
            for degrees in [x, y, z].into_iter().flatten() {
                if !degrees.is_finite() {
                    return Err(Error::Protocol(format!(
                        "rotation angle must be finite, got {degrees}"
                    )));
                }
            }
        }
        Command::Zoom { factor } => {
            if !factor.is_finite() || *factor <= 0.0 {
                return Err(Error::Protocol(format!(
                    "zoom factor must be positive, got {factor}"
                )));
            }
        }
        Command::AddBox { size, .. } => {
            for component in [size.x, size.y, size.z] {
                if !component.is_finite() || component <= 0.0 {
                    return Err(Error::Protocol(format!(
                        "box size components must be positive, got {component}"
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// The cumulative visualization state produced by applying a command
/// sequence from [`RenderState::default`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderState {
    pub loaded_structure: Option<Structure>,
    pub surfaces: Vec<SurfaceEntry>,
    pub style_rules: Vec<StyleRule>,
    pub camera: Camera,
    pub active_box: Option<BoxRegion>,
}

impl RenderState {
    /// Identifier of the loaded structure, if any.
    pub fn loaded_structure_id(&self) -> Option<&str> {
        self.loaded_structure.as_ref().map(|s| s.id.as_str())
    }

    /// Apply one command, mutating the state on success.
    ///
    /// On error the state is left exactly as it was: every mutation happens
    /// only after all validation for that command has passed.
    pub fn apply(&mut self, command: &Command, source: &dyn StructureSource) -> Result<()> {
        validate_args(command)?;
        match command {
            Command::LoadPdb { pdb_id } => {
                let structure = source
                    .fetch(pdb_id)
                    .map_err(|message| Error::RemoteExecution { message })?;
                self.loaded_structure = Some(structure);
                self.surfaces.clear();
                self.style_rules.clear();
                self.active_box = None;
                self.camera = Camera::default();
            }
            Command::HighlightHetero => {
                let structure = self.require_structure("highlight_hetero")?;
                if structure.hetero_atoms == 0 {
                    // Nothing to highlight; still a successful transition.
                    return Ok(());
                }
                self.upsert_style(StyleRule {
                    selection: Selection::hetero(),
                    kind: StyleKind::Stick,
                    params: Some(StyleParams {
                        color: Some("orangeCarbon".to_string()),
                        ..StyleParams::default()
                    }),
                });
            }
            Command::ShowSurface { selection } => {
                self.require_structure("show_surface")?;
                self.surfaces.push(SurfaceEntry {
                    selection: selection.clone(),
                });
            }
            Command::Rotate { x, y, z } => {
                // Fixed composition order: x, then y, then z.
                for (axis, degrees) in [(Axis::X, x), (Axis::Y, y), (Axis::Z, z)] {
                    if let Some(degrees) = degrees {
                        self.camera.rotate(axis, *degrees);
                    }
                }
            }
            Command::Zoom { factor } => {
                self.camera.distance /= factor;
            }
            Command::AddBox { center, size } => {
                self.active_box = Some(BoxRegion {
                    center: *center,
                    size: *size,
                });
            }
            Command::SetStyle {
                selection,
                kind,
                params,
            } => {
                self.require_structure("set_style")?;
                self.upsert_style(StyleRule {
                    selection: selection.clone(),
                    kind: *kind,
                    params: params.clone(),
                });
            }
            Command::ResetView => {
                self.surfaces.clear();
                self.style_rules.clear();
                self.active_box = None;
                self.camera = Camera::default();
            }
        }
        Ok(())
    }

    fn require_structure(&self, command: &str) -> Result<&Structure> {
        self.loaded_structure.as_ref().ok_or_else(|| {
            Error::RemoteExecution {
                message: format!("{command} requires a loaded structure"),
            }
        })
    }

    fn upsert_style(&mut self, rule: StyleRule) {
        match self
            .style_rules
            .iter_mut()
            .find(|existing| existing.selection == rule.selection)
        {
            Some(existing) => *existing = rule,
            None => self.style_rules.push(rule),
        }
    }
}
