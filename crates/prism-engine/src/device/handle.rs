/// Opaque id of a device resource (texture, framebuffer, buffer, program).
///
/// A device never reuses an id, so a handle minted before a context loss can
/// never alias a resource created afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuHandle(u32);

impl GpuHandle {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Monotonic id of one successful context acquisition.
///
/// Generation 1 is the first context; every restore mints the next one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextGeneration(u64);

impl ContextGeneration {
    pub const FIRST: ContextGeneration = ContextGeneration(1);

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A device handle stamped with the generation it was created in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tagged {
    pub generation: ContextGeneration,
    pub handle: GpuHandle,
}

impl Tagged {
    #[inline]
    pub const fn new(generation: ContextGeneration, handle: GpuHandle) -> Self {
        Self { generation, handle }
    }

    /// The handle, if it belongs to `current`; `None` means it must be recreated.
    #[inline]
    pub fn live(self, current: ContextGeneration) -> Option<GpuHandle> {
        (self.generation == current).then_some(self.handle)
    }
}

/// Generation-tagged slot for a lazily created resource.
///
/// `get_or_try_insert` recreates the value whenever the stored generation is stale.
#[derive(Debug)]
pub struct GenerationSlot<T> {
    value: Option<(ContextGeneration, T)>,
}

impl<T> Default for GenerationSlot<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T> GenerationSlot<T> {
    pub fn get_or_try_insert<E>(
        &mut self,
        generation: ContextGeneration,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<&mut T, E> {
        let value = match self.value.take() {
            Some((g, v)) if g == generation => v,
            old => match create() {
                Ok(v) => v,
                Err(e) => {
                    self.value = old;
                    return Err(e);
                }
            },
        };
        let (_, v) = self.value.insert((generation, value));
        Ok(v)
    }

    /// The stored value if it belongs to `generation`.
    pub fn get_mut(&mut self, generation: ContextGeneration) -> Option<&mut T> {
        match &mut self.value {
            Some((g, v)) if *g == generation => Some(v),
            _ => None,
        }
    }

    pub fn is_live(&self, generation: ContextGeneration) -> bool {
        matches!(&self.value, Some((g, _)) if *g == generation)
    }

    /// Removes the value regardless of its generation.
    pub fn take(&mut self) -> Option<(ContextGeneration, T)> {
        self.value.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_is_live_only_in_its_generation() {
        let g1 = ContextGeneration::FIRST;
        let t = Tagged::new(g1, GpuHandle::from_raw(7));
        assert_eq!(t.live(g1), Some(GpuHandle::from_raw(7)));
        assert_eq!(t.live(g1.next()), None);
    }

    #[test]
    fn slot_recreates_on_generation_change() {
        let mut slot = GenerationSlot::default();
        let mut created = 0;
        let g1 = ContextGeneration::FIRST;

        for _ in 0..3 {
            slot.get_or_try_insert::<()>(g1, || {
                created += 1;
                Ok(created)
            })
            .unwrap();
        }
        assert_eq!(created, 1);

        let v = *slot
            .get_or_try_insert::<()>(g1.next(), || {
                created += 1;
                Ok(created)
            })
            .unwrap();
        assert_eq!(v, 2);
        assert!(!slot.is_live(g1));
    }

    #[test]
    fn slot_keeps_old_value_when_creation_fails() {
        let mut slot = GenerationSlot::default();
        let g1 = ContextGeneration::FIRST;
        slot.get_or_try_insert::<()>(g1, || Ok(1)).unwrap();
        assert!(slot.get_or_try_insert(g1.next(), || Err("lost")).is_err());
        assert!(slot.is_live(g1));
    }
}
