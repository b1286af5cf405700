mod common;

use approx::assert_relative_eq;
use ndarray::{s, Array2};
use std::sync::Arc;

use cirrus::core::constants::{
    ChannelCalibration, ChannelRole, ChannelSpec, DatestringConvention, DecisionThresholds,
    ScanGeometry,
};
use cirrus::core::scene::DiagnosticsConfig;
use cirrus::io::{parse_platform, ProductDate, RegularGeoCoding, WaterMaskService};
use cirrus::{
    ClassificationFlags, ClassifierConfig, GeoPos, LookupTables, Rect, SceneClassifier, SceneInputs,
    SensorProfile, WaterClass,
};

use common::{constant_net, init_logging, sun_zenith_net, uniform_scene};

/// Water everywhere except a land strip west of 11.1E
struct StripMask;

impl WaterMaskService for StripMask {
    fn water_fraction(&self, pos: GeoPos) -> u8 {
        if pos.lon < 11.095 {
            0
        } else {
            100
        }
    }

    fn water_sample(&self, pos: GeoPos) -> WaterClass {
        if pos.lon < 11.095 {
            WaterClass::Land
        } else {
            WaterClass::Water
        }
    }
}

fn cloud_block(y: usize, x: usize) -> f32 {
    if (8..12).contains(&y) && (8..12).contains(&x) {
        60.0
    } else {
        30.0
    }
}

fn scene_classifier(config: ClassifierConfig) -> SceneClassifier {
    let profile = config.profile().unwrap();
    let tables = Arc::new(LookupTables::new(&profile.scan).unwrap());
    let net = Some(sun_zenith_net(profile.nn_input_count()));
    SceneClassifier::new(config, tables, net).unwrap()
}

fn with_all_diagnostics() -> ClassifierConfig {
    ClassifierConfig {
        diagnostics: DiagnosticsConfig {
            nn_output: true,
            reflectances: true,
            brightness_temperatures: true,
            emissivity: true,
            geometry: true,
        },
        ..Default::default()
    }
}

#[test]
fn test_cloud_block_with_buffer_over_water() {
    init_logging();
    let classifier = scene_classifier(with_all_diagnostics());
    let mut inputs = uniform_scene(classifier.profile(), 24, 24, cloud_block);
    inputs.water_fraction = Some(Array2::from_elem((24, 24), 100));

    let product = classifier.classify(&inputs).unwrap();

    assert_eq!(product.flags.dim(), (24, 24));
    assert_eq!(product.count(ClassificationFlags::CLOUD), 16);
    assert!(product.flag(9, 9).contains(ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_SURE));
    assert!(product.flag(7, 7).contains(ClassificationFlags::CLOUD_BUFFER));
    assert!(product.flag(13, 10).contains(ClassificationFlags::CLOUD_BUFFER));
    assert!(!product.flag(5, 5).contains(ClassificationFlags::CLOUD_BUFFER));
    assert!(!product.flag(5, 5).is_cloud());
    assert!(product.flags.iter().all(|&b| ClassificationFlags::from_bits(b).is_consistent()));

    let nn = product.band("nn_output").unwrap();
    assert_relative_eq!(nn[[9, 9]], 3.5, epsilon = 1e-4);
    assert_relative_eq!(nn[[0, 0]], 1.0, epsilon = 1e-4);
    assert_relative_eq!(product.band("bt_4").unwrap()[[3, 3]], 250.0, epsilon = 1e-2);
    assert_relative_eq!(product.band("reflectance_2").unwrap()[[3, 3]], 25.0);
    assert!(product.band("emissivity_3b").unwrap()[[3, 3]] > 0.0);
}

#[test]
fn test_land_pixels_are_not_buffered() {
    init_logging();
    let classifier = scene_classifier(ClassifierConfig::default());
    let mut inputs = uniform_scene(classifier.profile(), 24, 24, cloud_block);
    inputs.attach_services(Some(&StripMask), None, None);

    let product = classifier.classify(&inputs).unwrap();

    // columns 0..9 are land, 10 onwards water
    assert!(product.flag(7, 7).contains(ClassificationFlags::LAND));
    assert!(!product.flag(7, 7).contains(ClassificationFlags::CLOUD_BUFFER));
    assert!(product.flag(7, 12).contains(ClassificationFlags::CLOUD_BUFFER));
    assert!(!product.flag(7, 12).contains(ClassificationFlags::LAND));
}

#[test]
fn test_tiles_match_whole_scene() {
    init_logging();
    let classifier = scene_classifier(with_all_diagnostics());
    let mut inputs = uniform_scene(classifier.profile(), 30, 30, |y, x| {
        if (x * 5 + y * 3) % 13 < 3 {
            60.0
        } else {
            30.0
        }
    });
    inputs.water_fraction = Some(Array2::from_shape_fn((30, 30), |(_, x)| match x {
        x if x < 10 => 0,
        10 => 60,
        _ => 100,
    }));

    let whole = classifier.classify(&inputs).unwrap();
    for target in [Rect::new(4, 6, 9, 7), Rect::new(0, 0, 5, 30), Rect::new(25, 22, 5, 8)] {
        let tile = classifier.classify_tile(&inputs, target).unwrap();
        let window = s![target.y..target.y_end(), target.x..target.x_end()];
        assert_eq!(tile.region, target);
        assert_eq!(tile.flags, whole.flags.slice(window));
        for band in &tile.bands {
            let expected = whole.band(&band.name).unwrap().slice(window);
            for (a, b) in band.data.iter().zip(expected.iter()) {
                assert!(a == b || (a.is_nan() && b.is_nan()), "band {}", band.name);
            }
        }
    }
}

#[test]
fn test_view_zenith_from_scan_position() {
    init_logging();
    let config = ClassifierConfig {
        diagnostics: DiagnosticsConfig { geometry: true, ..Default::default() },
        ..Default::default()
    };
    let classifier = scene_classifier(config);
    let mut inputs = uniform_scene(classifier.profile(), 4, 20, |_, _| 30.0);
    inputs.view_zenith = None;
    inputs.relative_azimuth = None;
    inputs.column_offset = 190;
    inputs.scanline_width = Some(409);

    let product = classifier.classify(&inputs).unwrap();
    let vza = product.band("view_zenith").unwrap();
    assert!(vza[[0, 14]] < 0.01);
    assert!(vza[[0, 0]] > vza[[0, 14]]);
    let raa = product.band("relative_azimuth").unwrap();
    assert!(raa.iter().all(|v| v.is_finite() && v.abs() <= 180.0));
}

#[test]
fn test_geocoded_inputs() {
    init_logging();
    let profile = SensorProfile::from_id("NOAA18").unwrap();
    let template = uniform_scene(&profile, 6, 5, |_, _| 30.0);
    let geocoding = RegularGeoCoding::new(48.0, 11.0, -0.01, 0.01).unwrap();
    let inputs = SceneInputs::with_geocoding(
        template.date,
        template.sun_zenith.clone(),
        template.channels.clone(),
        &geocoding,
    )
    .unwrap();

    assert_relative_eq!(inputs.latitude[[3, 0]], 47.97, epsilon = 1e-4);
    assert_relative_eq!(inputs.longitude[[0, 4]], 11.04, epsilon = 1e-4);
}

#[test]
fn test_shadow_requires_cloud_top_height() {
    init_logging();
    let classifier = scene_classifier(ClassifierConfig { cloud_shadow: true, ..Default::default() });
    let inputs = uniform_scene(classifier.profile(), 8, 8, |_, _| 30.0);
    assert!(classifier.classify(&inputs).is_err());
}

#[test]
fn test_tile_outside_scene_rejected() {
    init_logging();
    let classifier = scene_classifier(ClassifierConfig::default());
    let inputs = uniform_scene(classifier.profile(), 8, 8, |_, _| 30.0);
    assert!(classifier.classify_tile(&inputs, Rect::new(6, 6, 4, 4)).is_err());
}

#[test]
fn test_product_name_drives_profile_and_date() {
    init_logging();
    let name = "NSS.GHRR.NN.D08197.S1200.E1341.B1617273.GC";
    let id = parse_platform(name).unwrap();
    assert_eq!(id, "NOAA18");
    let profile = SensorProfile::from_id(id).unwrap();
    let date = ProductDate::from_name(name, &profile).unwrap();
    assert_eq!(date.day_of_year, 197);
    assert_eq!(date.date, chrono::NaiveDate::from_ymd_opt(2008, 7, 15).unwrap());
    assert!(date.distance_correction < 1.0);
}

/// Three reflective channels and no thermal bands, as on ocean-colour sensors
fn reflective_only_profile() -> SensorProfile {
    let reflective = |name: &str, role, solar_irradiance, response_width| ChannelSpec {
        name: name.to_string(),
        role,
        calibration: ChannelCalibration::Reflective { solar_irradiance, response_width },
    };
    SensorProfile {
        id: "OCEAN3".to_string(),
        platform: "Test-1".to_string(),
        instrument: "RADIOMETER".to_string(),
        channels: vec![
            reflective("reflectance_443", ChannelRole::Other, 190.0, 0.02),
            reflective("reflectance_665", ChannelRole::Visible, 150.0, 0.01),
            reflective("reflectance_865", ChannelRole::NearInfrared, 95.0, 0.04),
        ],
        nn_input_channels: vec![0, 1, 2],
        thresholds: DecisionThresholds::default(),
        datestring: DatestringConvention::Compact,
        scan: ScanGeometry { altitude_km: 799.0, lac_samples: 2250, gac_samples: 1125, max_scan_angle: 55.0 },
    }
}

#[test]
fn test_custom_reflective_profile_runs_network_only() {
    init_logging();
    let profile = reflective_only_profile();
    assert!(!profile.supports_decision_tree());
    assert_eq!(profile.nn_input_count(), 6);

    let config = ClassifierConfig {
        sensor: "unused".to_string(),
        profile: Some(profile.clone()),
        ..Default::default()
    };
    let tables = Arc::new(LookupTables::new(&profile.scan).unwrap());
    let classifier = SceneClassifier::new(config, tables, Some(constant_net(3.5, 6))).unwrap();
    assert_eq!(classifier.profile().id, "OCEAN3");

    let (rows, cols) = (6, 7);
    let channels = vec![
        Array2::from_elem((rows, cols), 12.0f32),
        Array2::from_elem((rows, cols), 30.0f32),
        Array2::from_elem((rows, cols), 32.0f32),
    ];
    let mut inputs = SceneInputs::new(
        chrono::NaiveDate::from_ymd_opt(2011, 8, 2).unwrap(),
        Array2::from_elem((rows, cols), 35.0f32),
        Array2::from_shape_fn((rows, cols), |(y, _)| 40.0 - 0.01 * y as f32),
        Array2::from_shape_fn((rows, cols), |(_, x)| -20.0 + 0.01 * x as f32),
        channels,
    )
    .unwrap();
    inputs.water_fraction = Some(Array2::from_elem((rows, cols), 100));

    let product = classifier.classify(&inputs).unwrap();
    let tree_bits = ClassificationFlags::RGCT
        | ClassificationFlags::RRCT
        | ClassificationFlags::FMFT
        | ClassificationFlags::TMFT_CLEAR
        | ClassificationFlags::EMISSIVITY_CLOUD;
    for flag in product.flags.iter() {
        let flag = ClassificationFlags::from_bits(*flag);
        assert!(flag.contains(ClassificationFlags::CLOUD | ClassificationFlags::CLOUD_SURE));
        assert!(!flag.contains(ClassificationFlags::SNOW_ICE));
        assert!(!flag.intersects(tree_bits));
    }
}
