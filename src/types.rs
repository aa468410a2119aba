use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Dark,
    Light,
}

impl Team {
    pub const ALL: [Team; 2] = [Team::Dark, Team::Light];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileType {
    Gray,
    Green,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayNightPhase {
    Day,
    Night,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoulView {
    pub id: String,
    #[serde(rename = "type")]
    pub team: Team,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub energy: f32,
    #[serde(rename = "maxEnergy")]
    pub max_energy: f32,
    pub mature: bool,
}

/// Partial character record. Absent fields leave the receiver's copy as is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterPatch {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vx: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f32>,
    #[serde(rename = "maxEnergy", default, skip_serializing_if = "Option::is_none")]
    pub max_energy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mature: Option<bool>,
}

impl From<&SoulView> for CharacterPatch {
    fn from(view: &SoulView) -> Self {
        Self {
            id: view.id.clone(),
            team: Some(view.team),
            x: Some(view.x),
            y: Some(view.y),
            vx: Some(view.vx),
            vy: Some(view.vy),
            energy: Some(view.energy),
            max_energy: Some(view.max_energy),
            mature: Some(view.mature),
        }
    }
}

impl SoulView {
    /// Copies every present field of `patch` into `self`.
    pub fn apply_patch(&mut self, patch: &CharacterPatch) {
        if let Some(team) = patch.team {
            self.team = team;
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(vx) = patch.vx {
            self.vx = vx;
        }
        if let Some(vy) = patch.vy {
            self.vy = vy;
        }
        if let Some(max_energy) = patch.max_energy {
            self.max_energy = max_energy;
        }
        if let Some(energy) = patch.energy {
            self.energy = energy;
        }
        if let Some(mature) = patch.mature {
            self.mature = mature;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrbView {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub energy: f32,
    #[serde(rename = "respawnTime", default)]
    pub respawn_time: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NexusView {
    pub id: String,
    #[serde(rename = "type")]
    pub team: Team,
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpellView {
    pub id: String,
    #[serde(rename = "casterId")]
    pub caster_id: String,
    #[serde(rename = "type")]
    pub team: Team,
    #[serde(rename = "tileX")]
    pub tile_x: i32,
    #[serde(rename = "tileY")]
    pub tile_y: i32,
    #[serde(rename = "startedAt")]
    pub started_at: u64,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileView {
    #[serde(rename = "type")]
    pub tile_type: TileType,
    #[serde(rename = "worldX")]
    pub world_x: i32,
    #[serde(rename = "worldY")]
    pub world_y: i32,
}

/// Row-major tile grid, `tiles[y][x]`, `(0, 0)` at the top-left.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileMapView {
    pub width: i32,
    pub height: i32,
    pub tiles: Vec<Vec<TileView>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DayNightState {
    pub phase: DayNightPhase,
    pub progress: f32,
    #[serde(rename = "cycleMs")]
    pub cycle_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(rename = "darkSouls")]
    pub dark_souls: usize,
    #[serde(rename = "lightSouls")]
    pub light_souls: usize,
    #[serde(rename = "grayTiles")]
    pub gray_tiles: usize,
    #[serde(rename = "greenTiles")]
    pub green_tiles: usize,
    #[serde(rename = "orbsCollected")]
    pub orbs_collected: u64,
    pub deaths: u64,
    pub births: u64,
    pub conquests: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub characters: Vec<SoulView>,
    #[serde(rename = "energyOrbs")]
    pub energy_orbs: Vec<OrbView>,
    #[serde(default)]
    pub nexuses: Vec<NexusView>,
    #[serde(rename = "tileMap", default, skip_serializing_if = "Option::is_none")]
    pub tile_map: Option<TileMapView>,
    #[serde(rename = "activeSpells", default)]
    pub active_spells: Vec<SpellView>,
    #[serde(
        rename = "dayNightState",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub day_night_state: Option<DayNightState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soul() -> SoulView {
        SoulView {
            id: "soul_1".to_string(),
            team: Team::Dark,
            x: 10.0,
            y: 20.0,
            vx: 1.0,
            vy: 0.0,
            energy: 50.0,
            max_energy: 100.0,
            mature: true,
        }
    }

    #[test]
    fn patch_leaves_absent_fields_untouched() {
        let mut view = soul();
        view.apply_patch(&CharacterPatch {
            id: "soul_1".to_string(),
            x: Some(99.0),
            ..CharacterPatch::default()
        });
        assert_eq!(view.x, 99.0);
        assert_eq!(view.y, 20.0);
        assert_eq!(view.energy, 50.0);
    }

    #[test]
    fn partial_patch_json_omits_absent_fields() {
        let patch = CharacterPatch {
            id: "soul_1".to_string(),
            energy: Some(3.0),
            ..CharacterPatch::default()
        };
        let json = serde_json::to_value(&patch).expect("patch serializes");
        assert_eq!(json, serde_json::json!({ "id": "soul_1", "energy": 3.0 }));
    }

    #[test]
    fn soul_team_is_encoded_as_type() {
        let json = serde_json::to_value(soul()).expect("soul serializes");
        assert_eq!(json["type"], "dark");
        assert_eq!(json["maxEnergy"], 100.0);
    }
}
