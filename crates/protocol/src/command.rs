//! The closed set of render commands and their typed payloads.

use serde::{Deserialize, Serialize};

/// A point or extent in model space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
	pub x: f64,
	pub y: f64,
	pub z: f64,
}

impl Vec3 {
	pub fn new(x: f64, y: f64, z: f64) -> Self {
		Self { x, y, z }
	}
}

/// Atom selection criteria, in the viewer's selection vocabulary.
///
/// All fields are optional; an empty selection matches the whole structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
	/// Chain identifier, e.g. `"A"`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain: Option<String>,
	/// Residue number.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resi: Option<u32>,
	/// Element symbol, e.g. `"Fe"`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub elem: Option<String>,
	/// Restrict to hetero (non-polymer) atoms.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hetflag: Option<bool>,
}

impl Selection {
	/// Selection covering every hetero atom in the structure.
	pub fn hetero() -> Self {
		Self {
			hetflag: Some(true),
			..Self::default()
		}
	}
}

/// The visualization styles a rule may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
	Stick,
	Cartoon,
	Sphere,
	Line,
}

/// Optional parameters for a style rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleParams {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub radius: Option<f64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub opacity: Option<f64>,
}

/// A render command with its typed arguments.
///
/// The set is closed: an envelope naming anything else fails to deserialize,
/// so "unknown command" is a parse error rather than a runtime default case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
	/// Load a structure by its four-character PDB identifier, replacing any
	/// previously loaded structure and resetting the view.
	LoadPdb { pdb_id: String },
	/// Style every hetero atom for visibility. No-op when the loaded
	/// structure has none.
	HighlightHetero,
	/// Add a molecular surface scoped to `selection`, or the whole structure
	/// when absent.
	ShowSurface {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		selection: Option<Selection>,
	},
	/// Rotate the camera. Each present axis is applied as an independent
	/// sequential rotation, in x, y, z order. Degrees.
	Rotate {
		#[serde(default, skip_serializing_if = "Option::is_none")]
		x: Option<f64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		y: Option<f64>,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		z: Option<f64>,
	},
	/// Scale the camera distance. Factors above 1 zoom in.
	Zoom { factor: f64 },
	/// Place a wireframe box, replacing any previous one.
	AddBox { center: Vec3, size: Vec3 },
	/// Apply a style rule to a selection, overwriting an existing rule for
	/// the same selection.
	SetStyle {
		selection: Selection,
		#[serde(rename = "type")]
		kind: StyleKind,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		params: Option<StyleParams>,
	},
	/// Clear surfaces, styles and shapes and restore the canonical camera,
	/// keeping the loaded structure.
	ResetView,
}

impl Command {
	/// Wire name of the command, for logging.
	pub fn name(&self) -> &'static str {
		match self {
			Command::LoadPdb { .. } => "load_pdb",
			Command::HighlightHetero => "highlight_hetero",
			Command::ShowSurface { .. } => "show_surface",
			Command::Rotate { .. } => "rotate",
			Command::Zoom { .. } => "zoom",
			Command::AddBox { .. } => "add_box",
			Command::SetStyle { .. } => "set_style",
			Command::ResetView => "reset_view",
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn load_pdb_wire_shape() {
		let cmd = Command::LoadPdb {
			pdb_id: "1CRN".into(),
		};
		let value = serde_json::to_value(&cmd).unwrap();
		assert_eq!(
			value,
			json!({"command": "load_pdb", "args": {"pdb_id": "1CRN"}})
		);
	}

	#[test]
	fn unit_command_omits_args() {
		let value = serde_json::to_value(Command::HighlightHetero).unwrap();
		assert_eq!(value, json!({"command": "highlight_hetero"}));
		let back: Command = serde_json::from_value(value).unwrap();
		assert_eq!(back, Command::HighlightHetero);
	}

	#[test]
	fn set_style_renames_kind_to_type() {
		let cmd = Command::SetStyle {
			selection: Selection {
				chain: Some("A".into()),
				..Selection::default()
			},
			kind: StyleKind::Cartoon,
			params: None,
		};
		let value = serde_json::to_value(&cmd).unwrap();
		assert_eq!(value["args"]["type"], "cartoon");
		assert_eq!(value["args"]["selection"]["chain"], "A");
	}

	#[test]
	fn unknown_command_is_a_parse_error() {
		let result: Result<Command, _> =
			serde_json::from_value(json!({"command": "explode", "args": {}}));
		assert!(result.is_err());
	}

	#[test]
	fn rotate_accepts_partial_axes() {
		let cmd: Command = serde_json::from_value(json!({
			"command": "rotate",
			"args": {"x": 90.0}
		}))
		.unwrap();
		assert_eq!(
			cmd,
			Command::Rotate {
				x: Some(90.0),
				y: None,
				z: None
			}
		);
	}
}
