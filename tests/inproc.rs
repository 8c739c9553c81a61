// tests/inproc.rs

use rnano::options::RCVBUF;
use rnano::{Flags, NanoError, SocketType, Statistic};
use std::time::Duration;
mod common;

use common::{recv_bytes, send_bytes, test_socket, try_recv_bytes, unique_inproc_endpoint};

#[test]
fn bind_connect_round_trip() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let pull = test_socket(SocketType::Pull);
  let push = test_socket(SocketType::Push);

  pull.bind(&endpoint)?;
  push.connect(&endpoint)?;

  send_bytes(&push, &[1, 2, 3])?;
  assert_eq!(recv_bytes(&pull)?, vec![1, 2, 3]);
  Ok(())
}

#[test]
fn second_bind_on_same_name_is_rejected() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let first = test_socket(SocketType::Pull);
  let second = test_socket(SocketType::Pull);

  first.bind(&endpoint)?;
  let err = second.bind(&endpoint).unwrap_err();
  assert!(matches!(err, NanoError::AddrInUse(_)), "got {:?}", err);
  assert_eq!(second.statistic(Statistic::BindErrors)?, 1);
  assert_eq!(first.statistic(Statistic::BindErrors)?, 0);
  Ok(())
}

#[test]
fn connect_before_bind_delivers_once_bound() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let push = test_socket(SocketType::Push);
  push.connect(&endpoint)?;

  // Nothing to send to yet.
  assert_eq!(push.send(b"early", Flags::DONTWAIT), Err(NanoError::WouldBlock));
  assert_eq!(push.statistic(Statistic::InprogressConnections)?, 0);

  let sender = std::thread::spawn(move || {
    let result = send_bytes(&push, b"early");
    (push, result)
  });
  std::thread::sleep(Duration::from_millis(50));
  assert!(!sender.is_finished(), "send completed without a peer");

  let pull = test_socket(SocketType::Pull);
  pull.bind(&endpoint)?;
  assert_eq!(recv_bytes(&pull)?, b"early".to_vec());

  let (push, result) = sender.join().unwrap();
  result?;
  assert_eq!(push.statistic(Statistic::EstablishedConnections)?, 1);
  assert_eq!(pull.statistic(Statistic::AcceptedConnections)?, 1);
  Ok(())
}

#[test]
fn incompatible_protocols_never_pair_up() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let pull = test_socket(SocketType::Pull);
  let pair = test_socket(SocketType::Pair);

  pull.bind(&endpoint)?;
  // The connect itself succeeds; the endpoint just never gets a pipe.
  pair.connect(&endpoint)?;

  assert_eq!(pair.send(b"lost", Flags::DONTWAIT), Err(NanoError::WouldBlock));
  assert_eq!(pair.statistic(Statistic::EstablishedConnections)?, 0);
  assert_eq!(pair.statistic(Statistic::CurrentEpErrors)?, 1);
  assert_eq!(pull.statistic(Statistic::AcceptedConnections)?, 0);
  assert_eq!(pull.statistic(Statistic::CurrentConnections)?, 0);
  Ok(())
}

#[test]
fn incompatible_connector_is_skipped_by_later_bind() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let sub = test_socket(SocketType::Sub);
  let push = test_socket(SocketType::Push);
  sub.connect(&endpoint)?;
  push.connect(&endpoint)?;

  let pull = test_socket(SocketType::Pull);
  pull.bind(&endpoint)?;

  send_bytes(&push, b"for pull")?;
  assert_eq!(recv_bytes(&pull)?, b"for pull".to_vec());
  assert_eq!(pull.statistic(Statistic::AcceptedConnections)?, 1);
  assert_eq!(sub.statistic(Statistic::EstablishedConnections)?, 0);
  Ok(())
}

#[test]
fn full_receive_buffer_pushes_back_on_sender() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let pull = test_socket(SocketType::Pull);
  let push = test_socket(SocketType::Push);
  // Room for one 8-byte message; the next one is parked in the session.
  pull.set_option_raw(RCVBUF, &10i32.to_ne_bytes())?;

  pull.bind(&endpoint)?;
  push.connect(&endpoint)?;

  push.send(b"message1", Flags::DONTWAIT)?;
  push.send(b"message2", Flags::DONTWAIT)?;
  assert_eq!(push.send(b"message3", Flags::DONTWAIT), Err(NanoError::WouldBlock));

  assert_eq!(recv_bytes(&pull)?, b"message1".to_vec());
  push.send(b"message3", Flags::DONTWAIT)?;
  assert_eq!(recv_bytes(&pull)?, b"message2".to_vec());
  assert_eq!(recv_bytes(&pull)?, b"message3".to_vec());
  assert_eq!(try_recv_bytes(&pull), None);
  Ok(())
}

#[test]
fn messages_keep_their_order() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let pull = test_socket(SocketType::Pull);
  let push = test_socket(SocketType::Push);
  pull.bind(&endpoint)?;
  push.connect(&endpoint)?;

  let count = 200u32;
  let receiver = std::thread::spawn(move || {
    let mut seen = Vec::new();
    for _ in 0..count {
      let body = recv_bytes(&pull).unwrap();
      seen.push(u32::from_be_bytes(body.try_into().unwrap()));
    }
    seen
  });
  for i in 0..count {
    send_bytes(&push, &i.to_be_bytes())?;
  }
  let seen = receiver.join().unwrap();
  assert_eq!(seen, (0..count).collect::<Vec<_>>());
  Ok(())
}

#[test]
fn connector_reattaches_to_a_new_listener() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let push = test_socket(SocketType::Push);
  push.connect(&endpoint)?;

  let first = test_socket(SocketType::Pull);
  first.bind(&endpoint)?;
  send_bytes(&push, b"one")?;
  assert_eq!(recv_bytes(&first)?, b"one".to_vec());
  first.close()?;

  assert_eq!(push.statistic(Statistic::BrokenConnections)?, 1);
  assert_eq!(push.statistic(Statistic::CurrentConnections)?, 0);

  let second = test_socket(SocketType::Pull);
  second.bind(&endpoint)?;
  send_bytes(&push, b"two")?;
  assert_eq!(recv_bytes(&second)?, b"two".to_vec());
  assert_eq!(push.statistic(Statistic::EstablishedConnections)?, 2);
  Ok(())
}

#[test]
fn shutdown_releases_the_name() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let first = test_socket(SocketType::Pull);
  let eid = first.bind(&endpoint)?;
  first.shutdown(eid)?;

  let second = test_socket(SocketType::Pull);
  second.bind(&endpoint)?;
  Ok(())
}

#[test]
fn bad_addresses_are_rejected() {
  let socket = test_socket(SocketType::Pair);
  assert!(matches!(socket.bind("inproc://"), Err(NanoError::InvalidArgument(_))));
  assert!(matches!(socket.bind("no-scheme"), Err(NanoError::InvalidArgument(_))));
  assert!(matches!(
    socket.connect("carrier-pigeon://coop"),
    Err(NanoError::ProtocolNotSupported(_))
  ));
  let long = format!("inproc://{}", "x".repeat(200));
  assert!(matches!(socket.bind(&long), Err(NanoError::NameTooLong(_))));
  // Parse errors are not transport bind failures.
  assert_eq!(socket.statistic(Statistic::BindErrors).unwrap(), 0);
}

#[test]
fn truncating_recv_reports_full_size() -> Result<(), NanoError> {
  let endpoint = unique_inproc_endpoint();
  let a = test_socket(SocketType::Pair);
  let b = test_socket(SocketType::Pair);
  a.bind(&endpoint)?;
  b.connect(&endpoint)?;

  send_bytes(&b, b"0123456789")?;
  let mut buf = [0u8; 4];
  assert_eq!(a.recv(&mut buf, Flags::empty())?, 10);
  assert_eq!(&buf, b"0123");
  Ok(())
}
