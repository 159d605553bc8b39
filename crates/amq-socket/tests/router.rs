use amq_socket::events::{self, Command, Envelope};
use amq_socket::{DependencyGroup, EventRouter, ListenerHandle, ListenerResult};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

fn drain(rx: &mut UnboundedReceiver<Command>) -> Vec<String> {
	let mut out = Vec::new();
	while let Ok(command) = rx.try_recv() {
		out.push(command.command);
	}
	out
}

fn noop(_: &Value, _: &ListenerHandle, _: &Envelope) -> ListenerResult {
	Ok(())
}

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, tag: &str) -> impl Fn(&Value, &ListenerHandle, &Envelope) -> ListenerResult + Send + Sync + 'static {
	let log = Arc::clone(log);
	let tag = tag.to_string();
	move |_, _, envelope| {
		log.lock().unwrap().push(format!("{tag}:{}", envelope.command));
		Ok(())
	}
}

#[test]
fn leaderboard_start_and_stop_follow_listener_count() {
	let (router, mut commands) = EventRouter::new();

	let first = router.on(events::LEADERBOARD_UPDATE, noop);
	let second = router.on(events::LEADERBOARD_UPDATE, noop);
	assert_eq!(drain(&mut commands), vec!["get leaderboard level entries"]);
	assert_eq!(router.group_count(DependencyGroup::Leaderboard), 2);

	assert!(router.cancel(&first));
	assert!(drain(&mut commands).is_empty());

	assert!(router.cancel(&second));
	assert_eq!(drain(&mut commands), vec!["stop leaderboard listning"]);

	// Cancelling again must not push the count negative or resend stop.
	assert!(!router.cancel(&second));
	assert!(!second.cancel());
	assert!(drain(&mut commands).is_empty());
	assert_eq!(router.group_count(DependencyGroup::Leaderboard), 0);
}

#[test]
fn rooms_group_counts_both_event_names() {
	let (router, mut commands) = EventRouter::new();

	let a = router.on(events::ROOM_CHANGE, noop);
	let b = router.on(events::ROOM_CHANGE, noop);
	let c = router.on(events::NEW_ROOMS, noop);

	let sent = drain(&mut commands);
	assert_eq!(sent, vec!["get rooms"]);
	assert_eq!(router.group_count(DependencyGroup::Rooms), 3);

	a.cancel();
	c.cancel();
	assert!(drain(&mut commands).is_empty());

	b.cancel();
	assert_eq!(drain(&mut commands), vec!["remove roombrowser listners"]);
}

#[test]
fn stop_only_groups_send_nothing_on_start() {
	let (router, mut commands) = EventRouter::new();

	let expand = router.on(events::EXPAND_QUESTIONS, noop);
	let users = router.on(events::ALL_ONLINE_USERS, noop);
	assert!(drain(&mut commands).is_empty());

	expand.cancel();
	users.cancel();
	assert_eq!(drain(&mut commands), vec!["expandLibrary closed", "stop tracking online users"]);
}

#[test]
fn ungrouped_events_never_produce_commands() {
	let (router, mut commands) = EventRouter::new();

	let chat = router.on(events::GAME_CHAT_MESSAGE, noop);
	let any = router.on(events::ALL, noop);
	chat.cancel();
	any.cancel();

	assert!(drain(&mut commands).is_empty());
}

#[test]
fn dispatch_runs_exact_listeners_in_order_then_wildcards() {
	let (router, _commands) = EventRouter::new();
	let log = Log::default();

	router.on(events::ALL, recorder(&log, "wild"));
	router.on("quiz ready", recorder(&log, "first"));
	router.on("quiz ready", recorder(&log, "second"));
	router.on("other", recorder(&log, "other"));

	let delivered = router.route_inbound(&Envelope::new("quiz ready", json!({})));

	assert_eq!(delivered, 3);
	assert_eq!(*log.lock().unwrap(), vec!["first:quiz ready", "second:quiz ready", "wild:quiz ready"]);
}

#[test]
fn callback_receives_payload_handle_and_envelope() {
	let (router, _commands) = EventRouter::new();
	let seen = Arc::new(Mutex::new(None));

	let sink = Arc::clone(&seen);
	let handle = router.subscribe(
		"player profile",
		move |data, listener, envelope| {
			*sink.lock().unwrap() = Some((data.clone(), listener.value().clone(), envelope.command.clone()));
			Ok(())
		},
		json!({ "tag": 7 }),
	);

	router.route_inbound(&Envelope::new("player profile", json!({ "name": "kira" })));

	let (data, value, command) = seen.lock().unwrap().clone().unwrap();
	assert_eq!(data, json!({ "name": "kira" }));
	assert_eq!(value, json!({ "tag": 7 }));
	assert_eq!(command, "player profile");
	assert_eq!(handle.event_name(), "player profile");
}

#[test]
fn listener_added_during_dispatch_waits_for_next_envelope() {
	let (router, _commands) = EventRouter::new();
	let log = Log::default();

	let inner_router = router.clone();
	let inner_log = Arc::clone(&log);
	router.on("tick", move |_, listener, _| {
		inner_router.on("tick", recorder(&inner_log, "late"));
		listener.cancel();
		Ok(())
	});

	assert_eq!(router.route_inbound(&Envelope::new("tick", Value::Null)), 1);
	assert!(log.lock().unwrap().is_empty());

	assert_eq!(router.route_inbound(&Envelope::new("tick", Value::Null)), 1);
	assert_eq!(*log.lock().unwrap(), vec!["late:tick"]);
}

#[test]
fn listener_cancelled_during_dispatch_is_skipped() {
	let (router, _commands) = EventRouter::new();
	let log = Log::default();

	let victim: Arc<Mutex<Option<ListenerHandle>>> = Arc::default();
	let target = Arc::clone(&victim);
	router.on("tick", move |_, _, _| {
		if let Some(handle) = target.lock().unwrap().take() {
			handle.cancel();
		}
		Ok(())
	});
	*victim.lock().unwrap() = Some(router.on("tick", recorder(&log, "victim")));

	assert_eq!(router.route_inbound(&Envelope::new("tick", Value::Null)), 1);
	assert!(log.lock().unwrap().is_empty());
	assert_eq!(router.listener_count("tick"), 1);
}

#[test]
fn failing_and_panicking_listeners_do_not_stop_dispatch() {
	let (router, _commands) = EventRouter::new();
	let log = Log::default();

	router.on("tick", |_, _, _| Err("bad payload".into()));
	router.on("tick", |_, _, _| panic!("listener blew up"));
	router.on("tick", recorder(&log, "survivor"));

	assert_eq!(router.route_inbound(&Envelope::new("tick", Value::Null)), 3);
	assert_eq!(*log.lock().unwrap(), vec!["survivor:tick"]);

	// Still usable afterwards.
	router.route_inbound(&Envelope::new("tick", Value::Null));
	assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn self_cancelling_group_listener_sends_stop_once() {
	let (router, mut commands) = EventRouter::new();
	let hits = Arc::new(Mutex::new(0));

	let counter = Arc::clone(&hits);
	router.on(events::LEADERBOARD_UPDATE, move |_, listener, _| {
		*counter.lock().unwrap() += 1;
		listener.cancel();
		Ok(())
	});
	assert_eq!(drain(&mut commands), vec!["get leaderboard level entries"]);

	router.route_inbound(&Envelope::new(events::LEADERBOARD_UPDATE, json!([])));
	router.route_inbound(&Envelope::new(events::LEADERBOARD_UPDATE, json!([])));

	assert_eq!(*hits.lock().unwrap(), 1);
	assert_eq!(drain(&mut commands), vec!["stop leaderboard listning"]);
}

#[test]
fn scripted_session_yields_expected_command_stream() {
	let (router, mut commands) = EventRouter::new();

	let board = router.on(events::LEADERBOARD_UPDATE, noop);
	let rooms = router.on(events::ROOM_CHANGE, noop);
	let fresh = router.on(events::NEW_ROOMS, noop);
	let users = router.on(events::ALL_ONLINE_USERS, noop);
	router.send(Command::new("lobby", "game chat message").with_field("msg", json!("hi"))).unwrap();
	rooms.cancel();
	board.cancel();
	fresh.cancel();
	users.cancel();

	assert_eq!(
		drain(&mut commands),
		vec![
			"get leaderboard level entries",
			"get rooms",
			"game chat message",
			"stop leaderboard listning",
			"remove roombrowser listners",
			"stop tracking online users",
		]
	);
	for group in DependencyGroup::ALL {
		assert_eq!(router.group_count(group), 0, "{group} not idle");
	}
}
