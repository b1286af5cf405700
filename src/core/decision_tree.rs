//! Physical threshold tests (RGCT, RRCT, C3AT, TGCT, FMFT, TMFT, emissivity)
//! and their combination into decision-tree cloud and snow predicates.

use crate::core::constants::{ChannelRole, DecisionThresholds, SensorProfile};
use crate::core::lookup::LookupTables;
use crate::types::{ClassificationFlags, DerivedQuantities, GeoPos};

/// Channel indices of the decision-tree roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoleChannels {
    visible: usize,
    nir: usize,
    mid_ir: usize,
    thermal11: usize,
    thermal12: usize,
}

/// Outcome of every individual test plus the combined predicates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionTreeResult {
    pub rgct: bool,
    pub rrct: bool,
    pub c3at: bool,
    pub tgct: bool,
    pub fmft: bool,
    pub tmft_clear: bool,
    pub emissivity_cloud: bool,
    pub desert: bool,
    /// Not TMFT-clear and at least one cloud branch holds
    pub cloud_snow_check: bool,
    pub cloud: bool,
    pub snow: bool,
}

impl DecisionTreeResult {
    /// Diagnostic bits appended after the named classification bits
    pub fn diagnostic_flags(&self) -> ClassificationFlags {
        let mut flags = ClassificationFlags::NONE;
        flags.set(ClassificationFlags::RGCT, self.rgct);
        flags.set(ClassificationFlags::RRCT, self.rrct);
        flags.set(ClassificationFlags::C3AT, self.c3at);
        flags.set(ClassificationFlags::TGCT, self.tgct);
        flags.set(ClassificationFlags::FMFT, self.fmft);
        flags.set(ClassificationFlags::TMFT_CLEAR, self.tmft_clear);
        flags.set(ClassificationFlags::EMISSIVITY_CLOUD, self.emissivity_cloud);
        flags.set(ClassificationFlags::DESERT, self.desert);
        flags
    }
}

/// Decision-tree classifier bound to one sensor profile
#[derive(Debug, Clone)]
pub struct DecisionTreeClassifier {
    thresholds: DecisionThresholds,
    roles: Option<RoleChannels>,
}

impl DecisionTreeClassifier {
    pub fn new(profile: &SensorProfile) -> Self {
        let index = |role| profile.channel(role).map(|(i, _)| i);
        let roles = match (
            index(ChannelRole::Visible),
            index(ChannelRole::NearInfrared),
            index(ChannelRole::MidInfrared),
            index(ChannelRole::Thermal11),
            index(ChannelRole::Thermal12),
        ) {
            (Some(visible), Some(nir), Some(mid_ir), Some(thermal11), Some(thermal12)) => {
                Some(RoleChannels { visible, nir, mid_ir, thermal11, thermal12 })
            }
            _ => {
                log::warn!(
                    "Profile {} lacks decision-tree channel roles, running network-only",
                    profile.id
                );
                None
            }
        };

        Self {
            thresholds: profile.thresholds.clone(),
            roles,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.roles.is_some()
    }

    pub fn thresholds(&self) -> &DecisionThresholds {
        &self.thresholds
    }

    /// Runs every test for one valid pixel
    pub fn evaluate(
        &self,
        tables: &LookupTables,
        q: &DerivedQuantities,
        position: GeoPos,
        sun_zenith: f64,
        land: bool,
    ) -> DecisionTreeResult {
        let Some(ch) = self.roles else {
            return DecisionTreeResult::default();
        };
        let t = &self.thresholds;

        let a1 = q.albedo[ch.visible];
        let a2 = q.albedo[ch.nir];
        let bt3 = q.brightness_temp[ch.mid_ir];
        let bt4 = q.brightness_temp[ch.thermal11];
        let bt5 = q.brightness_temp[ch.thermal12];

        let desert = tables.is_desert(position);

        let rgct = land && a1 / 100.0 > tables.rgct.eval(q.ndvi);
        let rrct = land && !desert && a2 / a1 < t.rrct_ratio;
        let c3at = land && !desert && q.rho_3b > t.c3at_rho3b;
        let tgct = bt4 < t.tgct_bt4;
        let fmft = bt4 - bt5 > tables.fmft_threshold(bt4);

        let day = sun_zenith < t.tmft_day_sza;
        let (tmft_min, tmft_max) = tables.tmft_envelope(bt4, day);
        let bt34 = bt3 - bt4;
        let tmft_clear = bt34 >= tmft_min && bt34 <= tmft_max;

        let emissivity_cloud = q.emissivity_3b > t.emissivity;

        let branches = (rgct && fmft)
            || (desert && (fmft || position.lat.abs() < t.desert_abs_latitude))
            || (rrct && fmft)
            || (rrct && c3at);
        let cloud_snow_check = !tmft_clear && branches;

        DecisionTreeResult {
            rgct,
            rrct,
            c3at,
            tgct,
            fmft,
            tmft_clear,
            emissivity_cloud,
            desert,
            cloud_snow_check,
            cloud: cloud_snow_check && emissivity_cloud,
            snow: cloud_snow_check && q.emissivity_3b < t.emissivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (DecisionTreeClassifier, LookupTables) {
        let profile = SensorProfile::from_id("NOAA18").unwrap();
        let tables = LookupTables::new(&profile.scan).unwrap();
        (DecisionTreeClassifier::new(&profile), tables)
    }

    fn quantities(a1: f64, a2: f64, bt3: f64, bt4: f64, bt5: f64, emissivity: f64, rho3b: f64) -> DerivedQuantities {
        let mut q = DerivedQuantities::default();
        q.albedo[0] = a1;
        q.albedo[1] = a2;
        q.brightness_temp[2] = bt3;
        q.brightness_temp[3] = bt4;
        q.brightness_temp[4] = bt5;
        q.ndvi = (a2 - a1) / (a2 + a1);
        q.emissivity_3b = emissivity;
        q.rho_3b = rho3b;
        q
    }

    const EUROPE: GeoPos = GeoPos::new(48.0, 11.0);

    #[test]
    fn test_bright_land_cloud() {
        let (dt, tables) = setup();
        // bright, spectrally flat, warm 3.7 um, large split-window difference
        let q = quantities(60.0, 62.0, 290.0, 255.0, 250.0, 4.0, 0.2);
        let r = dt.evaluate(&tables, &q, EUROPE, 40.0, true);
        assert!(r.rgct && r.rrct && r.c3at && r.fmft);
        assert!(!r.tmft_clear);
        assert!(r.cloud);
        assert!(!r.snow);
        assert!(r.diagnostic_flags().contains(ClassificationFlags::RGCT | ClassificationFlags::FMFT));
    }

    #[test]
    fn test_low_emissivity_is_snow() {
        let (dt, tables) = setup();
        let q = quantities(60.0, 62.0, 290.0, 255.0, 250.0, 1.5, 0.2);
        let r = dt.evaluate(&tables, &q, EUROPE, 40.0, true);
        assert!(r.cloud_snow_check);
        assert!(r.snow);
        assert!(!r.cloud);
    }

    #[test]
    fn test_tmft_clear_vetoes() {
        let (dt, tables) = setup();
        let q = quantities(60.0, 62.0, 260.0, 255.0, 250.0, 4.0, 0.2);
        let r = dt.evaluate(&tables, &q, EUROPE, 40.0, true);
        assert!(r.tmft_clear);
        assert!(!r.cloud && !r.snow);
    }

    #[test]
    fn test_land_tests_need_land() {
        let (dt, tables) = setup();
        let q = quantities(60.0, 62.0, 290.0, 255.0, 250.0, 4.0, 0.2);
        let r = dt.evaluate(&tables, &q, EUROPE, 40.0, false);
        assert!(!r.rgct && !r.rrct && !r.c3at);
        assert!(!r.cloud);
    }

    #[test]
    fn test_desert_branch() {
        let (dt, tables) = setup();
        let sahara = GeoPos::new(25.0, 10.0);
        let q = quantities(40.0, 48.0, 320.0, 300.0, 299.5, 3.0, 0.01);
        let r = dt.evaluate(&tables, &q, sahara, 40.0, true);
        assert!(r.desert);
        assert!(!r.rrct && !r.c3at);
        assert!(!r.fmft);
        // inside +-60 deg the desert branch alone suffices
        assert!(r.cloud_snow_check);
    }

    #[test]
    fn test_profile_without_thermal_roles() {
        let mut profile = SensorProfile::from_id("NOAA18").unwrap();
        profile.channels.truncate(2);
        profile.nn_input_channels = vec![0, 1];
        let dt = DecisionTreeClassifier::new(&profile);
        assert!(!dt.is_enabled());
        let tables = LookupTables::new(&profile.scan).unwrap();
        let q = quantities(60.0, 62.0, 290.0, 255.0, 250.0, 4.0, 0.2);
        assert_eq!(dt.evaluate(&tables, &q, EUROPE, 40.0, true), DecisionTreeResult::default());
    }
}
