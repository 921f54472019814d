//! End-to-end flows across the workflow services

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    adapter::directory::Party,
    domain::{
        error::WorkflowError,
        event::{EntityKind, NotificationKind},
        opinion::OpinionStatus,
        position::PositionStatus,
        process::{Priority, ProcessStatus},
        tramitacao::{TramitacaoKind, TramitacaoStatus}
    },
    fixtures::{self, FailingDispatcher, StalledDispatcher},
    port::notify::NotificationDispatcher
};

#[tokio::test]
async fn test_opinion_round_trip_through_routing() {
    let harness = fixtures::harness();
    let services = &harness.services;

    // A: a new process starts clean
    let mut input = fixtures::new_process();
    input.priority = Priority::Alta;
    let process = services.processes.create(fixtures::GESTOR, input).await.unwrap();
    assert_eq!(process.status, ProcessStatus::Criado);
    assert_eq!((process.pending_opinions, process.pending_positions), (0, 0));

    // B: the recipient sector asks itself for an opinion through the routing
    let mut routed = fixtures::routing_to(&process.id, fixtures::S1);
    routed.kind = TramitacaoKind::SolicitacaoParecer;
    let t = services.routing.encaminhar(fixtures::GESTOR, routed).await.unwrap();
    services.routing.receber(fixtures::S1, &t.id).await.unwrap();
    services.routing.iniciar_analise(fixtures::S1, &t.id).await.unwrap();
    let (waiting, opinion) = services.routing.solicitar_parecer(fixtures::S1, &t.id).await.unwrap();

    assert_eq!(waiting.status, TramitacaoStatus::AguardandoParecer);
    assert_eq!(waiting.linked_entity.as_deref(), Some(opinion.id.as_str()));
    assert_eq!(opinion.issuing_sector, fixtures::S1);
    assert_eq!(opinion.requesting_sector, fixtures::S0);
    assert_eq!(opinion.tramitacao_id.as_deref(), Some(t.id.as_str()));
    assert_eq!(services.processes.get(&process.id).await.unwrap().pending_opinions, 1);

    let requested = harness.wait_for(NotificationKind::OpinionRequested, 1).await;
    assert_eq!(requested[0].recipient_id, fixtures::S1);

    // C: issue and approve; the counter drops and the routing wakes up
    services.opinions.emitir(fixtures::ANALISTA, &opinion.id, fixtures::draft()).await.unwrap();
    let approved = services.opinions.aprovar(fixtures::GESTOR, &opinion.id).await.unwrap();
    assert_eq!(approved.status, OpinionStatus::Aprovado);
    assert_eq!(services.processes.get(&process.id).await.unwrap().pending_opinions, 0);
    assert_eq!(services.routing.get(&t.id).await.unwrap().status, TramitacaoStatus::EmAnalise);

    let (original, reply) = services.routing.responder(fixtures::S1, &t.id, None).await.unwrap();
    assert_eq!(original.status, TramitacaoStatus::Concluida);
    assert_eq!(reply.kind, TramitacaoKind::RetornoParecer);
    assert_eq!(services.routing.fila(fixtures::S0).await.unwrap()[0].id, reply.id);
}

#[tokio::test]
async fn test_final_position_waits_for_external_position() {
    let harness = fixtures::harness();
    let services = &harness.services;
    let process = harness.open_process().await;

    let mut routed = fixtures::routing_to(&process.id, fixtures::MRE);
    routed.kind = TramitacaoKind::SolicitacaoPosicionamento;
    let t = services.routing.encaminhar(fixtures::GESTOR, routed).await.unwrap();
    services.routing.receber(fixtures::MRE, &t.id).await.unwrap();
    services.routing.iniciar_analise(fixtures::MRE, &t.id).await.unwrap();
    let (_, position) = services.routing.solicitar_posicionamento(fixtures::MRE, &t.id).await.unwrap();
    assert_eq!(services.processes.get(&process.id).await.unwrap().pending_positions, 1);

    // D: blocked while the position is outstanding
    let err = services.processes.set_final_position(fixtures::GESTOR, &process.id, "Favorável", "Consenso").await;
    assert!(matches!(err, Err(WorkflowError::PreconditionFailed(_))));
    assert_eq!(services.processes.get(&process.id).await.unwrap().status, ProcessStatus::Criado);

    let registered = services.positions.registrar(fixtures::MRE, &position.id, fixtures::reply()).await.unwrap();
    assert_eq!(registered.status, PositionStatus::Recebido);
    assert_eq!(services.routing.get(&t.id).await.unwrap().status, TramitacaoStatus::EmAnalise);

    let done = services.processes.set_final_position(fixtures::GESTOR, &process.id, "Favorável", "Consenso").await;
    let done = done.unwrap();
    assert_eq!(done.status, ProcessStatus::Finalizado);
    assert_eq!(done.final_position.as_deref(), Some("Favorável"));
    assert!(done.closed_at.is_some());

    let finalized = harness.wait_for(NotificationKind::ProcessFinalized, 1).await;
    assert_eq!(finalized[0].recipient_id, fixtures::S0);

    // terminal processes take no new work
    let err = services.routing.encaminhar(fixtures::GESTOR, fixtures::routing_to(&process.id, fixtures::S1)).await;
    assert!(matches!(err, Err(WorkflowError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_overdue_routing_leaves_sweep_once_concluded() {
    let harness = fixtures::harness();
    let services = &harness.services;
    let process = harness.open_process().await;

    // E
    let mut routed = fixtures::routing_to(&process.id, fixtures::S1);
    routed.deadline = Some(Utc::now() - Duration::hours(6));
    let t = services.routing.encaminhar(fixtures::GESTOR, routed).await.unwrap();
    services.routing.receber(fixtures::S1, &t.id).await.unwrap();
    services.routing.iniciar_analise(fixtures::S1, &t.id).await.unwrap();

    let overdue = services.deadlines.scan(Utc::now()).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].entity_kind, EntityKind::Tramitacao);
    assert_eq!(overdue[0].entity_id, t.id);

    services.routing.concluir(fixtures::S1, &t.id).await.unwrap();
    assert!(services.deadlines.scan(Utc::now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_is_repeatable_and_read_only() {
    let harness = fixtures::harness();
    let services = &harness.services;
    let process = harness.open_process().await;
    let past = Utc::now() - Duration::days(2);

    let mut routed = fixtures::routing_to(&process.id, fixtures::S1);
    routed.deadline = Some(past);
    services.routing.encaminhar(fixtures::GESTOR, routed).await.unwrap();
    let mut request = fixtures::opinion_request(&process.id, fixtures::S2);
    request.deadline = Some(past);
    services.opinions.solicitar(fixtures::GESTOR, request).await.unwrap();

    let before = services.routing.por_processo(&process.id).await.unwrap();
    let now = Utc::now();
    let first = services.deadlines.sweep_at(now).await.unwrap();
    let second = services.deadlines.sweep_at(now).await.unwrap();

    assert_eq!(first.escalations.len(), 2);
    assert_eq!(first, second);
    assert_eq!(services.routing.por_processo(&process.id).await.unwrap(), before);
    assert_eq!(harness.wait_for(NotificationKind::DeadlineOverdue, 4).await.len(), 4);
}

#[tokio::test]
async fn test_steps_cannot_be_skipped() {
    let harness = fixtures::harness();
    let routing = &harness.services.routing;
    let process = harness.open_process().await;
    let t = routing.encaminhar(fixtures::GESTOR, fixtures::routing_to(&process.id, fixtures::S1)).await.unwrap();

    let err = routing.iniciar_analise(fixtures::S1, &t.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    let err = routing.solicitar_parecer(fixtures::S1, &t.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    routing.receber(fixtures::S1, &t.id).await.unwrap();
    let err = routing.suspender(fixtures::S1, &t.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

    routing.iniciar_analise(fixtures::S1, &t.id).await.unwrap();
    let paused = routing.suspender(fixtures::S1, &t.id).await.unwrap();
    assert!(paused.is_paused());
    assert!(matches!(routing.receber(fixtures::S1, &t.id).await, Err(WorkflowError::InvalidTransition { .. })));
    assert_eq!(routing.retomar(fixtures::S1, &t.id).await.unwrap().status, TramitacaoStatus::EmAnalise);

    // nothing was persisted by the failed attempts
    assert_eq!(harness.services.opinions.por_processo(&process.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_failed_solicitation_is_compensated() {
    let harness = fixtures::harness();
    let services = &harness.services;
    let process = harness.open_process().await;

    // S1 is a sector, not an external body: the position cannot be opened
    let t = services.routing.encaminhar(fixtures::GESTOR, fixtures::routing_to(&process.id, fixtures::S1)).await;
    let t = t.unwrap();
    services.routing.receber(fixtures::S1, &t.id).await.unwrap();
    services.routing.iniciar_analise(fixtures::S1, &t.id).await.unwrap();

    let err = services.routing.solicitar_posicionamento(fixtures::S1, &t.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { entity: "external_body", .. }));

    let restored = services.routing.get(&t.id).await.unwrap();
    assert_eq!(restored.status, TramitacaoStatus::EmAnalise);
    assert_eq!(restored.linked_entity, None);
    assert_eq!(services.processes.get(&process.id).await.unwrap().pending_positions, 0);

    // an outstanding opinion from the same sector makes the routing's request conflict
    services.opinions.solicitar(fixtures::GESTOR, fixtures::opinion_request(&process.id, fixtures::S1)).await.unwrap();
    let err = services.routing.solicitar_parecer(fixtures::S1, &t.id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));
    assert_eq!(services.routing.get(&t.id).await.unwrap().status, TramitacaoStatus::EmAnalise);
    assert_eq!(services.processes.get(&process.id).await.unwrap().pending_opinions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_leave_counter_at_zero() {
    let harness = fixtures::harness();
    let process = harness.open_process().await;

    let mut seed = fixtures::seed();
    let sectors: Vec<String> = (0..8).map(|i| format!("X{}", i)).collect();
    seed.sectors.extend(sectors.iter().map(|id| Party {
        id:      id.clone(),
        name:    id.clone(),
        acronym: None,
        active:  true
    }));
    harness.directory.reload(&seed).await;

    let opinions = harness.services.opinions.clone();
    let mut ids = Vec::new();
    for sector in &sectors {
        let opinion = opinions.solicitar(fixtures::GESTOR, fixtures::opinion_request(&process.id, sector)).await;
        let opinion = opinion.unwrap();
        opinions.emitir(fixtures::ANALISTA, &opinion.id, fixtures::draft()).await.unwrap();
        ids.push(opinion.id);
    }
    assert_eq!(harness.services.processes.get(&process.id).await.unwrap().pending_opinions, 8);

    let handles: Vec<_> = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let opinions = Arc::clone(&opinions);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    opinions.aprovar(fixtures::GESTOR, &id).await
                } else {
                    opinions.reprovar(fixtures::ADMIN, &id).await
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let process = harness.services.processes.get(&process.id).await.unwrap();
    assert_eq!(process.pending_opinions, 0);
    let processes = &harness.services.processes;
    processes.update_status(fixtures::GESTOR, &process.id, ProcessStatus::Finalizado, None).await.unwrap();
}

#[tokio::test]
async fn test_dispatcher_failures_never_fail_transitions() {
    let dispatchers: [Arc<dyn NotificationDispatcher>; 2] = [Arc::new(FailingDispatcher), Arc::new(StalledDispatcher)];
    for dispatcher in dispatchers {
        let harness = fixtures::harness_with(dispatcher);
        let services = &harness.services;
        let process = harness.open_process().await;

        let t = services.routing.encaminhar(fixtures::GESTOR, fixtures::routing_to(&process.id, fixtures::S1)).await;
        let t = t.unwrap();
        services.routing.receber(fixtures::S1, &t.id).await.unwrap();

        let request = fixtures::opinion_request(&process.id, fixtures::S1);
        let opinion = services.opinions.solicitar(fixtures::GESTOR, request).await.unwrap();
        services.opinions.emitir(fixtures::ANALISTA, &opinion.id, fixtures::draft()).await.unwrap();
        services.opinions.aprovar(fixtures::GESTOR, &opinion.id).await.unwrap();

        let done = services.processes.set_final_position(fixtures::GESTOR, &process.id, "Contrário", "Mérito").await;
        assert_eq!(done.unwrap().status, ProcessStatus::Finalizado);
    }
}

#[tokio::test]
async fn test_unknown_actor_is_unauthorized_everywhere() {
    let harness = fixtures::harness();
    let services = &harness.services;
    let process = harness.open_process().await;

    let err = services.processes.create("ghost", fixtures::new_process()).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Unauthorized(_)));
    let err = services.routing.encaminhar("ghost", fixtures::routing_to(&process.id, fixtures::S1)).await;
    assert!(matches!(err, Err(WorkflowError::Unauthorized(_))));
    let err = services.opinions.solicitar("ghost", fixtures::opinion_request(&process.id, fixtures::S1)).await;
    assert!(matches!(err, Err(WorkflowError::Unauthorized(_))));
}
