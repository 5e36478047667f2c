//! 데이터그램 채널 추상화
//!
//! 송신측/수신측 상태 머신은 [`Channel`] 트레이트에만 의존한다.
//! 채널은 데이터그램을 통째로 전달하며 (부분 읽기 없음), 유실/손상/중복은 허용하지만
//! 한 방향 안에서의 순서는 보존한다. 대기 타임아웃은 채널이 아니라 각 엔드포인트가
//! `tokio::time::timeout`으로 건다.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::{Result, MAX_DATAGRAM};

/// [`Channel::send`]가 반환하는 boxed future
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// [`Channel::recv`]가 반환하는 boxed future
pub type RecvFuture<'a> = Pin<Box<dyn Future<Output = Result<Bytes>> + Send + 'a>>;

/// 신뢰할 수 없는 데이터그램 채널
///
/// object-safe 하므로 `Box<dyn Channel>`로 런타임에 선택할 수 있다.
pub trait Channel: Send + Sync {
    /// 데이터그램 하나를 상대에게 보낸다 (fire-and-forget).
    fn send<'a>(&'a self, datagram: &'a [u8]) -> SendFuture<'a>;

    /// 다음 데이터그램 하나를 기다린다. 취소(drop)해도 안전해야 한다.
    fn recv(&self) -> RecvFuture<'_>;
}

impl<T: Channel + ?Sized> Channel for Box<T> {
    fn send<'a>(&'a self, datagram: &'a [u8]) -> SendFuture<'a> {
        (**self).send(datagram)
    }

    fn recv(&self) -> RecvFuture<'_> {
        (**self).recv()
    }
}

/// 방향별 포트 쌍을 쓰는 UDP 채널
///
/// inbound 주소에 바인딩해서 받고, 모든 데이터그램은 outbound 주소로 보낸다.
pub struct UdpChannel {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,

    /// 수신 버퍼 (recv 호출마다 재사용)
    recv_buf: Mutex<Vec<u8>>,
}

impl UdpChannel {
    pub async fn bind(inbound: SocketAddr, outbound: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(inbound).await?;
        let local_addr = socket.local_addr()?;

        info!("UDP channel bound on {}, sending to {}", local_addr, outbound);

        Ok(Self {
            socket,
            local_addr,
            peer_addr: outbound,
            recv_buf: Mutex::new(vec![0u8; MAX_DATAGRAM]),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Channel for UdpChannel {
    fn send<'a>(&'a self, datagram: &'a [u8]) -> SendFuture<'a> {
        Box::pin(async move {
            self.socket.send_to(datagram, self.peer_addr).await?;
            Ok(())
        })
    }

    fn recv(&self) -> RecvFuture<'_> {
        Box::pin(async move {
            let mut buf = self.recv_buf.lock().await;
            loop {
                match self.socket.recv_from(&mut buf[..]).await {
                    Ok((len, _addr)) => return Ok(Bytes::copy_from_slice(&buf[..len])),
                    // 상대가 아직(또는 이미) 떠 있지 않으면 일부 플랫폼은 ICMP 에러를 돌려준다
                    Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                        warn!("peer unreachable, waiting: {}", e);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        })
    }
}

/// 프로세스 내부 채널 (테스트/시뮬레이션용)
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl MemoryChannel {
    /// 서로 연결된 두 끝점 생성
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();

        let a = MemoryChannel {
            tx: b_tx,
            rx: Mutex::new(a_rx),
        };
        let b = MemoryChannel {
            tx: a_tx,
            rx: Mutex::new(b_rx),
        };
        (a, b)
    }
}

impl Channel for MemoryChannel {
    fn send<'a>(&'a self, datagram: &'a [u8]) -> SendFuture<'a> {
        // 상대가 사라졌으면 UDP처럼 조용히 버려진다
        let _ = self.tx.send(Bytes::copy_from_slice(datagram));
        Box::pin(async { Ok(()) })
    }

    fn recv(&self) -> RecvFuture<'_> {
        Box::pin(async move {
            let mut rx = self.rx.lock().await;
            match rx.recv().await {
                Some(datagram) => Ok(datagram),
                // 보낼 수 있는 상대가 없으면 타임아웃만이 대기를 끝낸다
                None => std::future::pending().await,
            }
        })
    }
}
