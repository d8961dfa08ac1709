// User code never runs while the lock is held, so a poisoned lock means the pool itself is broken
// and its free list can no longer be trusted (we panic).
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - the free list may be \
    corrupted, so continued execution could hand out the same slot twice";
