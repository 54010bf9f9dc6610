use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

use qsmprep_core::{GridSpec, PixelType, Point3, Spacing3, Transform, TransformKind, Vector3, Volume};
use qsmprep_pipeline::{
    BatchRunner, CaseDiscovery, CaseStatus, ErrorKind, FileStore, LayoutConfig, Manifest, PipelineConfig,
    TransformPropagation, VisitLayout,
};

type B = Autodiff<NdArray<f32>>;

fn volume(values: impl Fn(usize, usize, usize) -> f32, pixel_type: PixelType) -> Volume<B> {
    let n = 12;
    let grid = GridSpec::axis_aligned([n, n, n], Point3::origin(), Spacing3::repeat(2.0)).unwrap();
    let mut data = Vec::with_capacity(n * n * n);
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                data.push(values(x, y, z));
            }
        }
    }
    Volume::from_values(data, grid, pixel_type, &Default::default()).unwrap()
}

fn write_visit(visit_dir: &Path, with_transform: bool) {
    std::fs::create_dir_all(visit_dir).unwrap();
    let mag = volume(|x, y, z| (x + y + z) as f32, PixelType::Continuous);
    qsmprep_io::save_volume(&mag, visit_dir.join("mag_canonical.nii.gz")).unwrap();
    qsmprep_io::save_volume(&mag, visit_dir.join("T1_corrected_canonical.nii.gz")).unwrap();
    if with_transform {
        let shift = Transform::rigid(Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0), Point3::new(11.0, 11.0, 11.0));
        qsmprep_io::save_transform(&shift, visit_dir.join("T1_corrected_canonical.nii_toMag_transform.tfm")).unwrap();
    }
}

fn write_patient(root: &Path, patient: &str, visits: &[(&str, bool)]) {
    let results = root.join(patient).join("RESULTS_xnatSpaceMS");
    std::fs::create_dir_all(&results).unwrap();
    let lesions = volume(|x, _, _| if (4..8).contains(&x) { 1.0 } else { 0.0 }, PixelType::Categorical);
    qsmprep_io::save_volume(&lesions, results.join(format!("{}_lesion_labels.nii.gz", patient))).unwrap();
    for (visit, with_transform) in visits {
        write_visit(&root.join(patient).join(visit).join("registered"), *with_transform);
    }
}

#[test]
fn test_discover_and_propagate_lesions_across_visits() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = dir.path().join("baseline");
    write_patient(&baseline, "p01", &[("2019_03", true), ("2021_07", true)]);
    write_patient(&baseline, "p02", &[("2020_01", false)]);
    // not a visit folder
    std::fs::create_dir_all(baseline.join("p02").join("notes")).unwrap();

    let layout = VisitLayout::new(vec![baseline.clone()], LayoutConfig::default());
    let cases = layout.discover().unwrap();
    let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["baseline/p01/2019_03", "baseline/p01/2021_07", "baseline/p02/2020_01"]);
    assert!(cases[0].file("lesions").unwrap().ends_with("p01_lesion_labels.nii.gz"));
    assert!(cases[2].file("t1_to_mag").is_none());

    let config = PipelineConfig::default().with_transform_kind(TransformKind::Rigid);
    let pipeline = TransformPropagation::<B>::new(PipelineConfig {
        dependent_keys: vec!["lesions".to_string()],
        ..config
    })
    .unwrap();

    let manifest_path = dir.path().join("manifest.jsonl");
    let manifest = Manifest::open(&manifest_path).unwrap();
    let (reports, summary) = BatchRunner::new()
        .with_threads(2)
        .run(&cases, Some(&manifest), |case| {
            let store = FileStore::<B>::for_case(case, Default::default());
            pipeline.apply_dependents_from_store(&case.id, &store, &store, &store)
        })
        .unwrap();
    drop(manifest);

    assert_eq!(summary.total, 3);
    assert_eq!(summary.success, 2);
    assert_eq!(summary.failed, 1);
    let missing = reports.iter().find(|r| r.case_id == "baseline/p02/2020_01").unwrap();
    assert!(matches!(
        missing.status,
        CaseStatus::Failed {
            kind: ErrorKind::MissingResource,
            ..
        }
    ));

    let out = baseline.join("p01/2021_07/registered/lesions_MSpace_Mask.nii.gz");
    assert!(out.is_file());
    let mask: Volume<B> = qsmprep_io::load_volume(&out, &Default::default()).unwrap();
    assert_eq!(mask.pixel_type(), PixelType::Categorical);
    // x in [4, 8) shifted by one 2 mm voxel
    let values = mask.to_vec().unwrap();
    assert_eq!(values[5], 1.0);
    assert_eq!(values[4], 0.0);
    assert_eq!(values[8], 1.0);
    assert_eq!(values[9], 0.0);

    assert_eq!(Manifest::read(&manifest_path).unwrap().len(), 3);
}
