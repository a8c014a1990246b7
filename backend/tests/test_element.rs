//! Element protocol steps driven by hand, without an orchestrator

use std::collections::HashMap;

use hydro_simulator_core_rs::physics::{ElementView, ScriptedLink, ScriptedRates};
use hydro_simulator_core_rs::{
    Element, ElementId, ElementStatus, MaterialTransfer, Message, MoveOutcome, NeighborKind,
    ProtocolViolation,
};

fn scripted(links: &[(u32, u32, f64, f64)]) -> ScriptedRates {
    ScriptedRates::new(links.iter().map(|&(from, to, rate, duration)| ScriptedLink {
        from: ElementId(from),
        to: ElementId(to),
        rate,
        duration,
    }))
}

fn views(elements: &[Element]) -> HashMap<ElementId, ElementView> {
    elements.iter().map(|e| (e.id(), e.view())).collect()
}

fn deliver(elements: &mut [Element], messages: Vec<Message>) {
    for message in messages {
        let target = elements
            .iter_mut()
            .find(|e| e.id() == message.target())
            .unwrap();
        match message {
            Message::ProxyUpdate {
                from,
                proxy_index,
                nominal_flow_rate,
                expiration_time,
                ..
            } => target
                .apply_reciprocal_update(proxy_index, from, nominal_flow_rate, expiration_time)
                .unwrap(),
            Message::Transfer {
                from,
                proxy_index,
                transfer,
                ..
            } => target.accept_transfer(proxy_index, from, transfer).unwrap(),
        }
    }
}

/// One full tick: negotiate, move, receive
fn tick(elements: &mut [Element], physics: &ScriptedRates, next_sync: f64) {
    let published = views(elements);
    let mut mail = Vec::new();
    for element in elements.iter_mut() {
        let outcome = element.negotiate_flow_rates(&published, physics);
        assert!(outcome.violations.is_empty());
        mail.extend(outcome.messages);
    }
    deliver(elements, mail);

    let mut mail = Vec::new();
    for element in elements.iter_mut() {
        if let MoveOutcome::Stepped(step) = element.select_timestep_and_move_water(next_sync).unwrap() {
            mail.extend(step.messages);
        }
    }
    deliver(elements, mail);

    for element in elements.iter_mut() {
        element.receive_water_and_advance_time();
    }
}

fn pair(a_material: f64, b_material: f64, end: f64) -> Vec<Element> {
    let mut a = Element::new(ElementId(0), a_material, end);
    let mut b = Element::new(ElementId(1), b_material, end);
    Element::connect(&mut a, &mut b, NeighborKind::Mesh, false, false).unwrap();
    vec![a, b]
}

#[test]
fn test_negotiation_is_reciprocal() {
    let mut elements = pair(10.0, 0.0, 20.0);
    let physics = scripted(&[(0, 1, 2.0, 3.0)]);
    let published = views(&elements);

    let outcome = elements[0].negotiate_flow_rates(&published, &physics);
    assert_eq!(outcome.negotiated.len(), 1);
    assert_eq!(
        outcome.messages,
        vec![Message::ProxyUpdate {
            from: ElementId(0),
            to: ElementId(1),
            proxy_index: 0,
            nominal_flow_rate: -2.0,
            expiration_time: 3.0,
        }]
    );
    // The larger ID never initiates
    assert!(elements[1]
        .negotiate_flow_rates(&published, &physics)
        .messages
        .is_empty());

    deliver(&mut elements, outcome.messages);
    let (a, b) = (&elements[0].neighbors()[0], &elements[1].neighbors()[0]);
    assert_eq!(a.nominal_flow_rate(), -b.nominal_flow_rate());
    assert_eq!(a.expiration_time(), b.expiration_time());
}

#[test]
fn test_scenario_a_by_hand() {
    let mut elements = pair(100.0, 0.0, 5.0);
    let physics = scripted(&[(0, 1, 10.0, 5.0)]);

    tick(&mut elements, &physics, 5.0);

    assert_eq!(elements[0].material(), 50.0);
    assert_eq!(elements[1].material(), 50.0);
    assert_eq!(elements[0].current_time(), 5.0);
    assert_eq!(elements[1].current_time(), 5.0);
    assert_eq!(elements[0].neighbors()[0].cumulative_flow(), 50.0);
    assert_eq!(elements[1].neighbors()[0].cumulative_flow(), -50.0);
    assert_eq!(elements[0].status(true), ElementStatus::Done);
}

#[test]
fn test_step_bounded_by_sync_point() {
    let mut elements = pair(100.0, 0.0, 10.0);
    let physics = scripted(&[(0, 1, 10.0, 8.0)]);

    tick(&mut elements, &physics, 3.0);
    assert_eq!(elements[0].current_time(), 3.0);
    assert_eq!(elements[1].material(), 30.0);
    assert_eq!(elements[0].status(true), ElementStatus::Synced);

    // Link still valid until 8; the next step runs to it
    tick(&mut elements, &physics, 10.0);
    assert_eq!(elements[0].current_time(), 8.0);
    assert_eq!(elements[1].material(), 80.0);
}

#[test]
fn test_expiration_capped_at_end_time() {
    let mut elements = pair(1.0, 1.0, 4.0);
    let physics = scripted(&[(0, 1, 0.1, 100.0)]);
    let published = views(&elements);

    let outcome = elements[0].negotiate_flow_rates(&published, &physics);
    assert_eq!(outcome.negotiated[0].expiration_time, 4.0);
}

#[test]
fn test_one_way_link_clamps_reverse_flow() {
    let mut a = Element::new(ElementId(0), 0.0, 5.0);
    let mut b = Element::new(ElementId(1), 50.0, 5.0);
    // b may only receive
    Element::connect(&mut a, &mut b, NeighborKind::Channel, false, true).unwrap();
    let mut elements = vec![a, b];
    let physics = scripted(&[(1, 0, 10.0, 5.0)]);

    let published = views(&elements);
    let outcome = elements[0].negotiate_flow_rates(&published, &physics);
    assert_eq!(outcome.negotiated[0].nominal_flow_rate, 0.0);
    assert!(outcome.negotiated[0].clamped);
    deliver(&mut elements, outcome.messages);

    tick(&mut elements, &physics, 5.0);
    assert_eq!(elements[1].material(), 50.0);
}

#[test]
fn test_scenario_b_rationing() {
    let mut z = Element::new(ElementId(0), 20.0, 5.0);
    let mut p = Element::new(ElementId(1), 0.0, 5.0);
    let mut q = Element::new(ElementId(2), 0.0, 5.0);
    Element::connect(&mut z, &mut p, NeighborKind::Mesh, false, false).unwrap();
    Element::connect(&mut z, &mut q, NeighborKind::Mesh, false, false).unwrap();
    let mut elements = vec![z, p, q];
    let physics = scripted(&[(0, 1, 5.0, 5.0), (0, 2, 5.0, 5.0)]);

    let published = views(&elements);
    let mail = elements[0].negotiate_flow_rates(&published, &physics).messages;
    deliver(&mut elements, mail);

    let step = match elements[0].select_timestep_and_move_water(5.0).unwrap() {
        MoveOutcome::Stepped(step) => step,
        other => panic!("expected a step, got {other:?}"),
    };
    assert!(step.plan.is_rationed());
    assert_eq!(step.plan.fraction(), 0.4);
    assert_eq!(elements[0].material(), 0.0);

    let amounts: Vec<f64> = step
        .messages
        .iter()
        .map(|m| match m {
            Message::Transfer { transfer, .. } => transfer.material(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(amounts, vec![10.0, 10.0]);
}

#[test]
fn test_receive_waits_for_all_inflow() {
    let mut elements = pair(100.0, 0.0, 5.0);
    let physics = scripted(&[(0, 1, 10.0, 5.0)]);
    let published = views(&elements);
    let mail = elements[0].negotiate_flow_rates(&published, &physics).messages;
    deliver(&mut elements, mail);

    // Receiver steps but the sender has not moved yet
    assert!(matches!(
        elements[1].select_timestep_and_move_water(5.0).unwrap(),
        MoveOutcome::Stepped(_)
    ));
    let before = elements[1].clone();
    assert!(!elements[1].receive_water_and_advance_time());
    assert!(!elements[1].receive_water_and_advance_time());
    assert_eq!(elements[1], before);
    assert_eq!(elements[1].status(false), ElementStatus::Blocked);
}

#[test]
fn test_blocked_until_neighbor_renegotiates() {
    let mut elements = pair(10.0, 10.0, 10.0);
    // Unnegotiated links expire at the start time
    assert!(matches!(
        elements[0].select_timestep_and_move_water(10.0).unwrap(),
        MoveOutcome::Blocked { bound } if bound == 0.0
    ));
    let physics = scripted(&[]);
    tick(&mut elements, &physics, 10.0);
    assert!(elements.iter().all(|e| e.is_done()));
}

#[test]
fn test_transfer_outside_window_rejected() {
    let mut elements = pair(10.0, 0.0, 10.0);
    let late = MaterialTransfer::new(3.0, 4.0, 1.0).unwrap();
    // Link expires at 0, so [3, 4] lies outside the open window
    let err = elements[1]
        .accept_transfer(0, ElementId(0), late)
        .unwrap_err();
    assert!(matches!(err, ProtocolViolation::RejectedTransfer { .. }));
}

#[test]
fn test_delivery_from_wrong_sender_rejected() {
    let mut elements = pair(10.0, 0.0, 10.0);
    let err = elements[1]
        .apply_reciprocal_update(0, ElementId(7), 1.0, 2.0)
        .unwrap_err();
    assert!(matches!(err, ProtocolViolation::WrongSender { .. }));

    let err = elements[1]
        .apply_reciprocal_update(3, ElementId(0), 1.0, 2.0)
        .unwrap_err();
    assert!(matches!(err, ProtocolViolation::UnknownProxy { .. }));
}

#[test]
fn test_connect_rejects_duplicates_and_self() {
    let mut elements = pair(1.0, 1.0, 5.0);
    let (a, b) = elements.split_at_mut(1);
    assert!(Element::connect(&mut a[0], &mut b[0], NeighborKind::Mesh, false, false).is_err());

    let mut lone = Element::new(ElementId(4), 0.0, 5.0);
    let mut same = Element::new(ElementId(4), 0.0, 5.0);
    assert!(Element::connect(&mut lone, &mut same, NeighborKind::Mesh, false, false).is_err());
}

#[test]
fn test_source_term_is_booked() {
    let mut element = Element::new(ElementId(0), 5.0, 5.0);
    assert_eq!(element.apply_source_term(3.0), 3.0);
    assert_eq!(element.apply_source_term(-20.0), -8.0);
    assert_eq!(element.material(), 0.0);
    assert_eq!(element.ledger().created(), 3.0);
    assert_eq!(element.ledger().destroyed(), 8.0);
    element.check_invariant().unwrap();
}

#[test]
fn test_pack_round_trip_keeps_inbox() {
    let mut elements = pair(100.0, 0.0, 5.0);
    let physics = scripted(&[(0, 1, 10.0, 5.0)]);
    let published = views(&elements);
    let mail = elements[0].negotiate_flow_rates(&published, &physics).messages;
    deliver(&mut elements, mail);
    if let MoveOutcome::Stepped(step) = elements[0].select_timestep_and_move_water(5.0).unwrap() {
        deliver(&mut elements, step.messages);
    }

    let packed = elements[1].pack().unwrap();
    let restored = Element::unpack(&packed).unwrap();
    assert_eq!(restored, elements[1]);
    assert_eq!(restored.material_in_flight(), 50.0);
}
