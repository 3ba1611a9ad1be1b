mod support;

use support::watchface::{self, Face};
use wearleak::analysis::{AnalysisSettings, Analyzer};
use wearleak::stg::{self, Callback, Event, State, Stg, TRANSITIONS};

#[test]
fn one_step_from_null_is_exactly_the_null_transitions() {
    let expected: Vec<_> = TRANSITIONS.iter().filter(|t| t.source == State::Null).collect();
    let paths = stg::paths_from(State::Null, 1);
    assert_eq!(paths.len(), expected.len());
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0][0].event, Event::Select);
    assert_eq!(paths[0][0].target, State::Interactive);
}

#[test]
fn every_path_is_connected_and_bounded() {
    for k in 1..=4 {
        for path in stg::paths_from(State::Null, k) {
            assert!(!path.is_empty() && path.len() <= k);
            assert_eq!(path[0].source, State::Null);
            for pair in path.windows(2) {
                assert_eq!(pair[0].target, pair[1].source);
            }
        }
    }
}

#[test]
fn ambient_is_entered_only_through_standby() {
    for t in TRANSITIONS.iter().filter(|t| t.target == State::Ambient) {
        assert_eq!(t.event, Event::Standby);
        assert!(t.callbacks.contains(&Callback::OnAmbientModeChanged(true)));
    }
}

#[test]
fn callbacks_resolve_to_engine_and_service_methods() {
    let mut face = Face::new();
    let visibility = face.visibility_toggles_sensor();
    let ambient = face.ambient_unregisters(false);
    let service = face.service();
    let program = face.finish();
    let mut analyzer = Analyzer::new(&program, AnalysisSettings::default());
    let engine = program.class_by_name(watchface::ENGINE).unwrap();

    let stg = Stg::construct(&mut analyzer, engine, false).unwrap();
    assert_eq!(stg.callback_method(Callback::OnVisibilityChanged(true)), Some(visibility));
    assert_eq!(stg.callback_method(Callback::OnVisibilityChanged(false)), Some(visibility));
    assert_eq!(stg.callback_method(Callback::OnAmbientModeChanged(true)), Some(ambient));
    assert_eq!(stg.callback_method(Callback::OnDraw), None);
    let factory = stg.callback_method(Callback::ServiceOnCreateEngine).unwrap();
    assert_eq!(program.method(factory).class, service);
    assert!(stg.callback_method(Callback::ServiceOnCreate).is_some());
    assert!(stg.callback_method(Callback::ServiceOnDestroy).is_some());
    assert!(stg.summary(Callback::OnVisibilityChanged(true)).is_none());
}

#[test]
fn construct_with_lookups_stores_refined_summaries() {
    let program = watchface::leaky_face();
    let mut analyzer = Analyzer::new(&program, AnalysisSettings::default());
    let engine = program.class_by_name(watchface::ENGINE).unwrap();
    let stg = Stg::construct(&mut analyzer, engine, true).unwrap();

    let visible = stg.summary(Callback::OnVisibilityChanged(true)).unwrap();
    assert_eq!(visible.acquires.len(), 1);
    assert!(visible.releases.is_empty());

    let hidden = stg.summary(Callback::OnVisibilityChanged(false)).unwrap();
    assert!(hidden.acquires.is_empty());
    assert_eq!(hidden.releases.len(), 1);

    // The guarded unregister is seen but not guaranteed.
    let ambient = stg.summary(Callback::OnAmbientModeChanged(true)).unwrap();
    assert_eq!(ambient.labels.len(), 1);
    assert!(ambient.releases.is_empty());
}
