use std::{
    io,
    marker::PhantomData,
    net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4},
    os::unix::io::{AsRawFd, RawFd},
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::{
    fs::File,
    io::{unix::AsyncFd, AsyncWriteExt, BufWriter},
};

// Strong type for the raw ICMP socket. Probing is IPv4 only, so there is
// no domain selection here; the socket is non-blocking from the start so
// it can be driven through AsyncFd.
pub struct ICMPSocket(Socket);

impl ICMPSocket {
    pub fn new(bind_interface: Option<&str>) -> io::Result<ICMPSocket> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        socket.set_nonblocking(true)?;
        let socket = match bind_interface {
            Some(iface) => bind_to_device(socket, iface)?,
            None => socket,
        };

        Ok(ICMPSocket(socket))
    }

    pub fn get_ref(&self) -> &Socket {
        &self.0
    }
}

impl AsRawFd for ICMPSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

pub struct AsyncICMPSocket {
    inner: AsyncFd<ICMPSocket>,
}

impl AsyncICMPSocket {
    pub fn new(socket: ICMPSocket) -> io::Result<Self> {
        Ok(Self {
            inner: AsyncFd::new(socket)?,
        })
    }

    /// Send one datagram to `addr`. ICMP is addressed by IP only; the port
    /// in the sockaddr is a placeholder to satisfy the API shape.
    pub async fn send_to(&mut self, packet: &[u8], addr: Ipv4Addr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(addr, 0)));
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| inner.get_ref().get_ref().send_to(packet, &addr)) {
                Ok(res) => return res,
                Err(_would_block) => continue,
            }
        }
    }

    /// Receive the next datagram into `buf`, returning its length.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.inner.readable().await?;
            // Safety: recv only writes initialized bytes into the buffer
            let uninit_slice = unsafe {
                core::mem::transmute::<&mut [u8], &mut [core::mem::MaybeUninit<u8>]>(&mut *buf)
            };
            match guard.try_io(|inner| inner.get_ref().get_ref().recv(uninit_slice)) {
                Ok(res) => return res,
                Err(_would_block) => continue,
            }
        }
    }
}

pub fn bind_to_device(socket: Socket, bind_interface: &str) -> io::Result<Socket> {
    // Socket2 bind_device does not have nice error types, so we have to
    // handle the libc errors. In case, we get an error when binding, map it
    // into a more friendly std::io::Error
    if let Err(err) = socket.bind_device(Some(bind_interface.as_bytes())) {
        return if matches!(err.raw_os_error(), Some(libc::ENODEV)) {
            let error_msg = format!("error binding to device (`{}`): {}", bind_interface, err);
            Err(io::Error::new(io::ErrorKind::Other, error_msg))
        } else {
            let error_msg = format!("unexpected error binding device: {}", err);
            Err(io::Error::new(io::ErrorKind::Other, error_msg))
        };
    }

    Ok(socket)
}

// Get the IPv4 address of the interface the socket is bound to, for
// reporting which source the probes leave from.
pub fn interface_to_ipaddr(interface: &str) -> io::Result<Ipv4Addr> {
    let interface = pnet_datalink::interfaces()
        .into_iter()
        .find(|iface| iface.name == interface)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("interface `{}` not found", interface),
            )
        })?;

    interface
        .ips
        .iter()
        .find_map(|ip| match ip.ip() {
            IpAddr::V4(addr) => Some(addr),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("interface `{}` has no IPv4 address", interface),
            )
        })
}

/// A row type that can be appended to a results file.
pub trait Logging {
    fn header() -> &'static str;
    fn row(&self) -> String;
}

/// Appends `Logging` rows to a CSV file, one per probe result.
pub struct Logger<T> {
    out: BufWriter<File>,
    _marker: PhantomData<T>,
}

impl<T: Logging> Logger<T> {
    pub async fn new(path: &str) -> io::Result<Logger<T>> {
        let mut out = BufWriter::new(File::create(path).await?);
        out.write_all(T::header().as_bytes()).await?;
        out.write_all(b"\n").await?;
        Ok(Logger {
            out,
            _marker: PhantomData,
        })
    }

    pub async fn log(&mut self, entry: &T) -> io::Result<()> {
        self.out.write_all(entry.row().as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }
}
