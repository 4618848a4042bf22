use crate::ratelimit::TokenBucket;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep};

/// Smallest fraction of the capacity a stalled read waits for
const MIN_CHUNK_DIVISOR: u64 = 8;

/// `AsyncRead` adapter that stalls reads until the bucket holds enough tokens.
///
/// A read never takes more bytes than the bucket currently holds, so the bytes
/// delivered by time `t` never exceed `capacity + rate * t`. When the bucket
/// runs dry the read waits for a chunk of `capacity / 8` rather than a single
/// byte.
pub struct RateLimitedReader<R> {
    inner: R,
    bucket: TokenBucket,
    delay: Option<Pin<Box<Sleep>>>,
    scratch: Vec<u8>,
}

impl<R> RateLimitedReader<R> {
    pub fn new(inner: R, bucket: TokenBucket) -> Self {
        Self {
            inner,
            bucket,
            delay: None,
            scratch: Vec::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for RateLimitedReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let capacity = this.bucket.capacity();
        let min_chunk = (capacity / MIN_CHUNK_DIVISOR).max(1);
        let threshold = (buf.remaining() as u64).min(min_chunk);

        loop {
            if let Some(delay) = this.delay.as_mut() {
                ready!(delay.as_mut().poll(cx));
                this.delay = None;
            }
            match this.bucket.check(threshold, Instant::now()) {
                Ok(()) => break,
                Err(wait) => this.delay = Some(Box::pin(tokio::time::sleep(wait))),
            }
        }

        let granted = this.bucket.available(Instant::now()).min(capacity);
        let want = usize::try_from(granted)
            .unwrap_or(usize::MAX)
            .min(buf.remaining());

        let read = if buf.remaining() <= want {
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            buf.filled().len() - before
        } else {
            this.scratch.resize(want, 0);
            let mut limited = ReadBuf::new(&mut this.scratch[..want]);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut limited))?;
            buf.put_slice(limited.filled());
            limited.filled().len()
        };

        this.bucket.consume(read as u64);
        Poll::Ready(Ok(()))
    }
}
