/// Recycled receive buffers for the dispatch loop.
///
/// A buffer is taken for one datagram and given back once that datagram has
/// been fully processed. Handing the `Vec` back by value means nothing can
/// still hold a borrow of it.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    free: Vec<Vec<u8>>,
    max_pooled: usize,
}

impl BufferPool {
    pub fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            buffer_size,
            free: Vec::new(),
            max_pooled,
        }
    }

    /// A zeroed buffer of `buffer_size` bytes.
    pub fn take(&mut self) -> Vec<u8> {
        self.free
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size])
    }

    pub fn recycle(&mut self, mut buffer: Vec<u8>) {
        if self.free.len() >= self.max_pooled {
            return;
        }
        buffer.clear();
        buffer.resize(self.buffer_size, 0);
        self.free.push(buffer);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_and_recycle_reuses_allocation() {
        let mut pool = BufferPool::new(64, 4);
        let mut buffer = pool.take();
        assert_eq!(buffer.len(), 64);
        buffer[0] = 0xAA;
        let ptr = buffer.as_ptr();

        pool.recycle(buffer);
        assert_eq!(pool.available(), 1);

        let again = pool.take();
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(again.len(), 64);
        assert_eq!(again[0], 0);
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut pool = BufferPool::new(8, 2);
        for _ in 0..5 {
            pool.recycle(vec![1; 8]);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_resizes_shrunk_buffers() {
        let mut pool = BufferPool::new(16, 1);
        pool.recycle(vec![7; 3]);
        assert_eq!(pool.take(), vec![0; 16]);
    }
}
