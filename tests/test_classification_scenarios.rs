mod common;

use std::sync::Arc;

use cirrus::core::pixel_classifier::PixelClassifierParams;
use cirrus::core::radiometry;
use cirrus::{ClassificationFlags, LookupTables, PixelClassifier, PixelObservation, SensorProfile};

use common::{clear_land, constant_net, init_logging};

fn classifier(sensor: &str, nn: f64) -> PixelClassifier {
    let profile = SensorProfile::from_id(sensor).unwrap();
    let tables = Arc::new(LookupTables::new(&profile.scan).unwrap());
    let net = Some(constant_net(nn, profile.nn_input_count()));
    PixelClassifier::new(profile, tables, net, PixelClassifierParams::default()).unwrap()
}

#[test]
fn test_clear_land_pixel() {
    init_logging();
    let c = classifier("NOAA-14", 1.0);
    let obs = clear_land(c.profile());
    let flags = c.classify(&obs, &mut c.scratch()).flags;

    assert!(flags.contains(ClassificationFlags::LAND));
    assert!(!flags.contains(ClassificationFlags::CLOUD));
    assert!(!flags.contains(ClassificationFlags::SNOW_ICE));
    assert!(!flags.contains(ClassificationFlags::INVALID));
}

#[test]
fn test_snow_band_overrides_sure_cloud() {
    init_logging();
    let c = classifier("NOAA-14", 4.0);
    let obs = clear_land(c.profile());
    let flags = c.classify(&obs, &mut c.scratch()).flags;

    assert!(flags.contains(ClassificationFlags::SNOW_ICE));
    assert!(!flags.contains(ClassificationFlags::CLOUD_SURE));
    assert!(!flags.is_cloud());
}

/// Bright, spectrally flat land with a warm 3.7 um channel: the decision tree calls it cloud
fn bright_flat_land(profile: &SensorProfile) -> PixelObservation {
    let mut obs = clear_land(profile);
    obs.sun_zenith = 40.0;
    obs.channels[0] = 60.0;
    obs.channels[1] = 62.0;
    obs.channels[2] = radiometry::bt_to_radiance(290.0, profile, 2).unwrap();
    obs.channels[3] = radiometry::bt_to_radiance(255.0, profile, 3).unwrap();
    obs.channels[4] = radiometry::bt_to_radiance(250.0, profile, 4).unwrap();
    obs
}

#[test]
fn test_tree_cloud_is_sure_despite_clear_network() {
    init_logging();
    let c = classifier("NOAA18", 1.0);
    let obs = bright_flat_land(c.profile());
    let result = c.classify(&obs, &mut c.scratch());

    assert!(result.tree.cloud);
    assert!(result.derived.emissivity_3b > 2.2);
    assert!(result.flags.contains(ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_SURE));
    assert!(!result.flags.contains(ClassificationFlags::CLOUD_AMBIGUOUS));
    assert!(!result.flags.contains(ClassificationFlags::SNOW_ICE));
    assert!(result.flags.contains(ClassificationFlags::EMISSIVITY_CLOUD));
}

#[test]
fn test_snow_band_beats_tree_cloud() {
    init_logging();
    let c = classifier("NOAA18", 4.5);
    let obs = bright_flat_land(c.profile());
    let result = c.classify(&obs, &mut c.scratch());

    assert!(result.tree.cloud);
    assert!(result.flags.contains(ClassificationFlags::SNOW_ICE));
    assert!(!result.flags.contains(ClassificationFlags::CLOUD_SURE));
    assert!(!result.flags.is_cloud());
    assert!(result.flags.is_consistent());
}

#[test]
fn test_cloud_over_water_has_no_glint() {
    init_logging();
    let c = classifier("NOAA18", 3.5);
    let mut obs = clear_land(c.profile());
    obs.water_fraction = 100;
    obs.view_zenith = 30.0;
    obs.relative_azimuth = 180.0;
    let flags = c.classify(&obs, &mut c.scratch()).flags;

    assert!(flags.contains(ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_SURE));
    assert!(!flags.contains(ClassificationFlags::GLINT_RISK));
    assert!(!flags.contains(ClassificationFlags::LAND));
}

#[test]
fn test_coastline_pixel_is_neither_land_nor_water() {
    init_logging();
    let c = classifier("NOAA18", 1.0);
    let mut obs = clear_land(c.profile());
    obs.water_fraction = 40;
    obs.relative_azimuth = 180.0;
    obs.view_zenith = 30.0;
    let flags = c.classify(&obs, &mut c.scratch()).flags;

    assert!(flags.contains(ClassificationFlags::COASTLINE));
    assert!(!flags.contains(ClassificationFlags::LAND));
    assert!(!flags.contains(ClassificationFlags::GLINT_RISK));
}

/// Small deterministic generator for the randomized sweep
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next()
    }
}

#[test]
fn test_flag_words_always_consistent() {
    init_logging();
    let classifiers: Vec<_> = [0.5, 2.5, 3.5, 4.5]
        .iter()
        .map(|&v| classifier("NOAA17", v))
        .collect();
    let mut rng = Lcg(42);

    for i in 0..4000 {
        let c = &classifiers[i % classifiers.len()];
        let mut obs = clear_land(c.profile());
        obs.sun_zenith = rng.range(0.0, 100.0);
        obs.view_zenith = rng.range(0.0, 60.0);
        obs.relative_azimuth = rng.range(-180.0, 180.0);
        obs.latitude = rng.range(-80.0, 80.0);
        obs.longitude = rng.range(-180.0, 180.0);
        obs.water_fraction = [0u8, 30, 100, 255][(rng.next() * 4.0) as usize % 4];
        obs.channels[0] = rng.range(-5.0, 90.0);
        obs.channels[1] = rng.range(0.0, 90.0);
        for ch in 2..5 {
            obs.channels[ch] *= rng.range(0.2, 2.0);
        }

        let flags = c.classify(&obs, &mut c.scratch()).flags;
        assert!(flags.is_consistent(), "inconsistent flags {} for {:?}", flags, obs);
        if flags.is_invalid() {
            assert_eq!(flags, ClassificationFlags::INVALID);
            continue;
        }
        let sure = flags.contains(ClassificationFlags::CLOUD_SURE);
        let ambiguous = flags.contains(ClassificationFlags::CLOUD_AMBIGUOUS);
        assert_eq!(flags.is_cloud(), sure ^ ambiguous);
        if flags.contains(ClassificationFlags::SNOW_ICE) {
            assert!(!flags.is_cloud());
        }
        if flags.contains(ClassificationFlags::GLINT_RISK) {
            assert!(!flags.is_cloud() && !flags.contains(ClassificationFlags::SNOW_ICE));
            assert!(!flags.contains(ClassificationFlags::LAND));
        }
        let surfaces = [ClassificationFlags::LAND, ClassificationFlags::COASTLINE]
            .iter()
            .filter(|&&f| flags.contains(f))
            .count();
        assert!(surfaces <= 1);
    }
}

#[test]
fn test_below_horizon_is_invalid() {
    init_logging();
    let c = classifier("NOAA18", 1.0);
    let mut obs = clear_land(c.profile());
    obs.sun_zenith = 90.0;
    let r = c.classify(&obs, &mut c.scratch());
    assert_eq!(r.flags, ClassificationFlags::INVALID);
    assert!(r.nn_output.is_nan());
}
