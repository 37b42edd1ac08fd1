//! End-to-end tests for the registration pipeline on synthetic stacks.

use image::GrayImage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use em_registration::{
    CorrelationEngine, GeometryError, IoError, Metric, ProgressEvent, Rect, RegistrationConfig,
    RegistrationError, RegistrationPipeline, RunStatus, SliceError,
};

use super::test_utils::{
    file_names, texture, with_black_border, write_drifting_stack, CancelFlag, CancellingMatcher,
    CenterMatcher,
};

const DRIFTS: [(i64, i64); 5] = [(0, 0), (2, -1), (4, 1), (3, 3), (-1, 2)];

fn no_progress(_: ProgressEvent) {}

fn never() -> bool {
    false
}

#[test]
fn test_recovers_known_drift() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 64, 64, &DRIFTS);

    let config =
        RegistrationConfig::new(output.path(), Rect::new(24, 24, 16, 16)).with_max_shift(5, 5);
    let engine = CorrelationEngine::open(Metric::Zncc).unwrap();
    let mut pipeline = RegistrationPipeline::new(config, engine, no_progress, never);

    let outcome = pipeline.run(&slices).unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);

    let shifts: Vec<(i64, i64)> = outcome.shifts.iter().map(|s| (s.dx, s.dy)).collect();
    assert_eq!(shifts, DRIFTS.to_vec());

    let stats = pipeline.into_matcher().close();
    assert_eq!(stats.matches, DRIFTS.len() as u64 - 1);
}

#[test]
fn test_registered_slices_line_up() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 64, 64, &DRIFTS);

    let config =
        RegistrationConfig::new(output.path(), Rect::new(24, 24, 16, 16)).with_max_shift(5, 5);
    let engine = CorrelationEngine::open(Metric::Ssd).unwrap();
    let mut pipeline = RegistrationPipeline::new(config, engine, no_progress, never);
    let outcome = pipeline.run(&slices).unwrap();

    for shift in &outcome.shifts {
        let registered = image::open(&shift.output).unwrap().to_luma8();
        assert_eq!(registered.dimensions(), (64, 64));
        // Away from the uncovered border, every slice shows the reference scene
        for y in 10..54 {
            for x in 10..54 {
                assert_eq!(
                    registered.get_pixel(x, y).0[0],
                    texture(x as i64, y as i64),
                    "slice {} pixel ({}, {})",
                    shift.index,
                    x,
                    y
                );
            }
        }
    }
}

#[test]
fn test_runs_are_deterministic() {
    let input = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 48, 40, &DRIFTS);

    let run = || {
        let output = tempfile::tempdir().unwrap();
        let config =
            RegistrationConfig::new(output.path(), Rect::new(10, 10, 12, 12)).with_max_shift(3, 4);
        let mut pipeline =
            RegistrationPipeline::new(config, CenterMatcher::default(), no_progress, never);
        let outcome = pipeline.run(&slices).unwrap();

        let shifts: Vec<(i64, i64, u32, u32)> = outcome
            .shifts
            .iter()
            .map(|s| (s.dx, s.dy, s.match_x, s.match_y))
            .collect();
        (shifts, file_names(output.path()))
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert_eq!(first.1.len(), DRIFTS.len());
}

#[test]
fn test_cancellation_stops_after_current_slice() {
    let input = tempfile::tempdir().unwrap();
    let drifts = vec![(0, 0); 6];
    let slices = write_drifting_stack(input.path(), 32, 32, &drifts);

    // The k-th matcher call happens while slice k + 1 is processed
    for cancel_on_call in 1..=4 {
        let output = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let matcher = CancellingMatcher::new(cancel_on_call, CancelFlag::Raw(Arc::clone(&flag)));
        let config =
            RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8)).with_max_shift(2, 2);

        let check = Arc::clone(&flag);
        let mut pipeline = RegistrationPipeline::new(config, matcher, no_progress, move || {
            check.load(Ordering::SeqCst)
        });
        let outcome = pipeline.run(&slices).unwrap();

        let last_written = cancel_on_call + 1;
        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.processed(), last_written);
        assert_eq!(outcome.total_slices, 6);
        assert_eq!(file_names(output.path()).len(), last_written);
        assert_eq!(pipeline.into_matcher().calls(), cancel_on_call);
    }
}

#[test]
fn test_progress_fraction_is_increasing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 32, 32, &DRIFTS);

    let mut events = Vec::new();
    let config = RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8));
    let mut pipeline = RegistrationPipeline::new(
        config,
        CenterMatcher::default(),
        |e: ProgressEvent| events.push(e),
        never,
    );
    pipeline.run(&slices).unwrap();
    drop(pipeline);

    assert_eq!(events.len(), DRIFTS.len());
    assert!(events.windows(2).all(|w| w[0].fraction < w[1].fraction));
    assert_eq!(events.last().map(|e| e.fraction), Some(1.0));
    assert!(events.iter().all(|e| e.total == DRIFTS.len()));
}

#[test]
fn test_auto_crop_applies_to_every_slice() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 64, 64, &DRIFTS);
    for path in &slices {
        let bordered = with_black_border(image::open(path).unwrap().to_luma8(), 6);
        bordered.save(path).unwrap();
    }

    let config = RegistrationConfig::new(output.path(), Rect::new(24, 24, 16, 16))
        .with_max_shift(5, 5)
        .with_auto_crop(true);
    let engine = CorrelationEngine::open(Metric::Zncc).unwrap();
    let mut pipeline = RegistrationPipeline::new(config, engine, no_progress, never);
    let outcome = pipeline.run(&slices).unwrap();

    let shifts: Vec<(i64, i64)> = outcome.shifts.iter().map(|s| (s.dx, s.dy)).collect();
    assert_eq!(shifts, DRIFTS.to_vec());

    // Positions are reported in cropped coordinates
    assert_eq!((outcome.shifts[0].match_x, outcome.shifts[0].match_y), (18, 18));

    for shift in &outcome.shifts {
        let registered = image::open(&shift.output).unwrap();
        assert_eq!((registered.width(), registered.height()), (52, 52));
    }
}

#[test]
fn test_auto_crop_disjoint_from_template_is_rejected() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let out_dir = output.path().join("registered");
    let slices = write_drifting_stack(input.path(), 40, 40, &DRIFTS);
    for path in &slices {
        let bordered = with_black_border(image::open(path).unwrap().to_luma8(), 8);
        bordered.save(path).unwrap();
    }

    let config = RegistrationConfig::new(&out_dir, Rect::new(0, 0, 6, 6)).with_auto_crop(true);
    let mut pipeline =
        RegistrationPipeline::new(config, CenterMatcher::default(), no_progress, never);

    let result = pipeline.run(&slices);
    assert!(matches!(
        result,
        Err(RegistrationError::Geometry(GeometryError::CropTemplateDisjoint { .. }))
    ));
    assert!(!out_dir.exists(), "no output may be produced");
    assert_eq!(pipeline.into_matcher().calls, 0);
}

#[test]
fn test_all_black_reference_is_rejected_with_auto_crop() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let path = input.path().join("black.tif");
    GrayImage::new(20, 20).save(&path).unwrap();

    let config = RegistrationConfig::new(output.path(), Rect::new(2, 2, 4, 4)).with_auto_crop(true);
    let mut pipeline =
        RegistrationPipeline::new(config, CenterMatcher::default(), no_progress, never);
    assert!(matches!(
        pipeline.run(&[path]),
        Err(RegistrationError::Geometry(GeometryError::CropTemplateDisjoint { .. }))
    ));
}

#[test]
fn test_load_failure_aborts_and_keeps_earlier_outputs() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 32, 32, &DRIFTS);
    std::fs::write(&slices[2], b"not a tiff").unwrap();

    let config = RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8));
    let mut pipeline =
        RegistrationPipeline::new(config, CenterMatcher::default(), no_progress, never);

    match pipeline.run(&slices) {
        Err(RegistrationError::Slice {
            index,
            path,
            source,
        }) => {
            assert_eq!(index, 3);
            assert_eq!(path, slices[2]);
            assert!(matches!(source, SliceError::Io(IoError::Load { .. })));
        }
        other => panic!("expected a slice failure, got {:?}", other),
    }

    assert_eq!(
        file_names(output.path()),
        vec![
            "00000_slice_00000_registered.tif".to_string(),
            "00001_slice_00001_registered.tif".to_string(),
        ]
    );
}

#[test]
fn test_dimension_mismatch_aborts() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut slices = write_drifting_stack(input.path(), 32, 32, &DRIFTS[..2]);
    let odd = input.path().join("slice_99999.tif");
    GrayImage::from_pixel(30, 32, image::Luma([7])).save(&odd).unwrap();
    slices.push(odd);

    let config = RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8));
    let mut pipeline =
        RegistrationPipeline::new(config, CenterMatcher::default(), no_progress, never);

    assert!(matches!(
        pipeline.run(&slices),
        Err(RegistrationError::Slice {
            index: 3,
            source: SliceError::Geometry(GeometryError::DimensionMismatch { .. }),
            ..
        })
    ));
}

#[test]
fn test_output_names_follow_processing_order() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let stack = write_drifting_stack(input.path(), 32, 32, &DRIFTS[..2]);

    // Resampling may select the same original slice more than once
    let slices = vec![stack[0].clone(), stack[0].clone(), stack[1].clone()];
    let config = RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8));
    let mut pipeline =
        RegistrationPipeline::new(config, CenterMatcher::default(), no_progress, never);
    pipeline.run(&slices).unwrap();

    assert_eq!(
        file_names(output.path()),
        vec![
            "00000_slice_00000_registered.tif".to_string(),
            "00001_slice_00000_registered.tif".to_string(),
            "00002_slice_00001_registered.tif".to_string(),
        ]
    );
}
