use std::alloc::{alloc_zeroed, dealloc, realloc, Layout};
use core::ptr::{self, NonNull};
use std::fmt;
use std::marker::PhantomData;

use rawpointer::PointerExt;

use crate::{MError, MResult};

const DEFAULT_CAPACITY: usize = 8;

/// Smallest power of two `>= n`; `next_power_of_two(0) == 1`.
///
/// `None` when no such power fits in `usize`.
pub fn next_power_of_two(n: usize) -> Option<usize> {
    if n == 0 {
        return Some(1);
    }
    n.checked_next_power_of_two()
}

/// Growable buffer of fixed-size, type-erased elements.
///
/// The element size is chosen at runtime, so one implementation serves
/// integers, floats and plain structs alike. Capacity is always a power of
/// two and doubles on demand. After [`RawArray::free`] the buffer holds no
/// memory; reads return `None` and writes fail with `InvalidArgument`.
pub struct RawArray {
    ptr: Option<NonNull<u8>>,
    len: usize,
    cap: usize,
    elem_size: usize,
    align: usize,
}

impl RawArray {
    pub fn new(capacity_hint: usize, elem_size: usize) -> MResult<Self> {
        Self::with_align(capacity_hint, elem_size, 1)
    }

    pub(crate) fn with_align(capacity_hint: usize, elem_size: usize, align: usize) -> MResult<Self> {
        if elem_size == 0 {
            return Err(MError::invalid("element size cannot be zero"));
        }
        let hint = if capacity_hint == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity_hint
        };
        let cap = next_power_of_two(hint).ok_or(MError::CapacityOverflow)?;
        let layout = layout_for(cap, elem_size, align)?;
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(MError::Allocation {
            bytes: layout.size(),
        })?;
        Ok(Self {
            ptr: Some(ptr),
            len: 0,
            cap,
            elem_size,
            align,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn element_size(&self) -> usize {
        self.elem_size
    }

    pub fn is_freed(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn out_of_range(&self, index: usize) -> bool {
        self.ptr.is_none() || index >= self.len
    }

    #[inline]
    fn slot(&self, index: usize) -> Option<*mut u8> {
        if self.out_of_range(index) {
            return None;
        }
        self.ptr
            .map(|p| unsafe { p.as_ptr().stride_offset(self.elem_size as isize, index) })
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.slot(index)
            .map(|p| unsafe { std::slice::from_raw_parts(p as *const u8, self.elem_size) })
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.slot(index)
            .map(|p| unsafe { std::slice::from_raw_parts_mut(p, self.elem_size) })
    }

    /// Bytes of all live elements, `len * element_size` long.
    pub fn as_bytes(&self) -> &[u8] {
        match self.ptr {
            Some(p) => unsafe { std::slice::from_raw_parts(p.as_ptr(), self.len * self.elem_size) },
            None => &[],
        }
    }

    /// Overwrites an existing slot. `value` must be exactly one element wide.
    pub fn set(&mut self, index: usize, value: &[u8]) -> MResult<()> {
        self.check_value(value)?;
        let elem_size = self.elem_size;
        let len = self.len;
        let dst = self
            .get_mut(index)
            .ok_or_else(|| MError::invalid(format!("index {} out of range (len={})", index, len)))?;
        debug_assert_eq!(dst.len(), elem_size);
        dst.copy_from_slice(value);
        Ok(())
    }

    pub fn append(&mut self, value: &[u8]) -> MResult<()> {
        self.check_value(value)?;
        let dst = self.reserve_slot()?;
        unsafe { ptr::copy_nonoverlapping(value.as_ptr(), dst, self.elem_size) };
        self.len += 1;
        Ok(())
    }

    pub fn free(&mut self) {
        if let Some(p) = self.ptr.take() {
            // accepted by `with_align` or `grow` when the block was made
            if let Ok(layout) = Layout::from_size_align(self.cap * self.elem_size, self.align) {
                unsafe { dealloc(p.as_ptr(), layout) };
            }
        }
        self.len = 0;
        self.cap = 0;
    }

    fn check_value(&self, value: &[u8]) -> MResult<()> {
        if self.ptr.is_none() {
            return Err(MError::invalid("array has been freed"));
        }
        if value.len() != self.elem_size {
            return Err(MError::invalid(format!(
                "value is {} bytes, element size is {}",
                value.len(),
                self.elem_size
            )));
        }
        Ok(())
    }

    /// Pointer to the slot at `len`, growing first when full. `len` is not
    /// touched; the caller bumps it after writing.
    fn reserve_slot(&mut self) -> MResult<*mut u8> {
        if self.ptr.is_none() {
            return Err(MError::invalid("array has been freed"));
        }
        if self.len == self.cap {
            self.grow()?;
        }
        match self.ptr {
            Some(p) => Ok(unsafe { p.as_ptr().stride_offset(self.elem_size as isize, self.len) }),
            None => Err(MError::invalid("array has been freed")),
        }
    }

    fn grow(&mut self) -> MResult<()> {
        let old_ptr = self.ptr.ok_or_else(|| MError::invalid("array has been freed"))?;
        let new_cap = self.cap.checked_mul(2).ok_or(MError::CapacityOverflow)?;
        let new_layout = layout_for(new_cap, self.elem_size, self.align)?;
        let old_layout = layout_for(self.cap, self.elem_size, self.align)?;
        let p = unsafe { realloc(old_ptr.as_ptr(), old_layout, new_layout.size()) };
        // on failure the old block is still ours and unchanged
        let p = NonNull::new(p).ok_or(MError::Allocation {
            bytes: new_layout.size(),
        })?;
        self.ptr = Some(p);
        self.cap = new_cap;
        Ok(())
    }
}

fn layout_for(cap: usize, elem_size: usize, align: usize) -> MResult<Layout> {
    let bytes = cap.checked_mul(elem_size).ok_or(MError::CapacityOverflow)?;
    Layout::from_size_align(bytes, align).map_err(|_| MError::CapacityOverflow)
}

impl Drop for RawArray {
    fn drop(&mut self) {
        self.free();
    }
}

impl fmt::Debug for RawArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawArray")
            .field("len", &self.len)
            .field("cap", &self.cap)
            .field("elem_size", &self.elem_size)
            .finish()
    }
}

/// Typed view over [`RawArray`] that owns its elements.
///
/// Elements are moved in and dropped on `set`, `free` or drop, so it can
/// hold things like open files.
pub struct Array<T> {
    raw: RawArray,
    _marker: PhantomData<T>,
}

impl<T> Array<T> {
    pub fn new(capacity_hint: usize) -> MResult<Self> {
        let raw = RawArray::with_align(
            capacity_hint,
            std::mem::size_of::<T>(),
            std::mem::align_of::<T>(),
        )?;
        Ok(Self {
            raw,
            _marker: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    pub fn is_freed(&self) -> bool {
        self.raw.is_freed()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.raw
            .slot(index)
            .map(|p| unsafe { &*(p as *const T) })
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.raw.slot(index).map(|p| unsafe { &mut *(p as *mut T) })
    }

    pub fn set(&mut self, index: usize, value: T) -> MResult<()> {
        let len = self.len();
        match self.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(MError::invalid(format!(
                "index {} out of range (len={})",
                index, len
            ))),
        }
    }

    pub fn append(&mut self, value: T) -> MResult<()> {
        let dst = self.raw.reserve_slot()?;
        unsafe { ptr::write(dst as *mut T, value) };
        self.raw.len += 1;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    pub fn as_slice(&self) -> &[T] {
        match self.raw.ptr {
            Some(p) => unsafe { std::slice::from_raw_parts(p.as_ptr() as *const T, self.len()) },
            None => &[],
        }
    }

    pub fn free(&mut self) {
        if let Some(p) = self.raw.ptr {
            let live = ptr::slice_from_raw_parts_mut(p.as_ptr() as *mut T, self.raw.len);
            // zero len first so a panicking Drop cannot cause a double drop
            self.raw.len = 0;
            unsafe { ptr::drop_in_place(live) };
        }
        self.raw.free();
    }
}

impl<T> Drop for Array<T> {
    fn drop(&mut self) {
        self.free();
    }
}

impl<T: fmt::Debug> fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    #[repr(C)]
    struct Student {
        id: i32,
        name: [u8; 20],
        score: f32,
    }

    fn student(id: i32, name: &str, score: f32) -> Student {
        let mut buf = [0u8; 20];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Student {
            id,
            name: buf,
            score,
        }
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), Some(1));
        assert_eq!(next_power_of_two(1), Some(1));
        assert_eq!(next_power_of_two(3), Some(4));
        assert_eq!(next_power_of_two(8), Some(8));
        assert_eq!(next_power_of_two(9), Some(16));
        assert_eq!(next_power_of_two(usize::MAX), None);
        for n in 1..2000usize {
            let p = next_power_of_two(n).unwrap();
            assert!(p.is_power_of_two() && p >= n && p / 2 < n);
        }
    }

    #[test]
    fn test_new_rounds_capacity() {
        assert_eq!(RawArray::new(0, 4).unwrap().capacity(), 8);
        assert_eq!(RawArray::new(3, 4).unwrap().capacity(), 4);
        assert_eq!(RawArray::new(100, 4).unwrap().capacity(), 128);
        assert!(matches!(
            RawArray::new(4, 0),
            Err(MError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_int_append_growth() {
        let mut arr = RawArray::new(0, 4).unwrap();
        let values: Vec<i32> = (1..=100).map(|v| v * 10).collect();
        for (i, v) in values.iter().enumerate() {
            arr.append(&v.to_ne_bytes()).unwrap();
            assert_eq!(arr.len(), i + 1);
            assert!(arr.capacity().is_power_of_two());
            assert!(arr.capacity() >= arr.len());
        }
        for (i, v) in values.iter().enumerate() {
            let got = arr.get(i).unwrap();
            assert_eq!(i32::from_ne_bytes(got.try_into().unwrap()), *v);
        }
        assert!(arr.get(arr.len()).is_none());
        assert_eq!(arr.as_bytes().len(), 400);
    }

    #[test]
    fn test_set_and_rejects() {
        let mut arr = RawArray::new(3, 8).unwrap();
        for v in [1.414213562f64, 2.718281828, 3.141592653] {
            arr.append(&v.to_ne_bytes()).unwrap();
        }
        arr.set(1, &42.195f64.to_ne_bytes()).unwrap();
        let got = f64::from_ne_bytes(arr.get(1).unwrap().try_into().unwrap());
        assert_eq!(got, 42.195);

        let before = arr.as_bytes().to_vec();
        let cap = arr.capacity();
        assert!(arr.set(3, &1.0f64.to_ne_bytes()).is_err());
        assert!(arr.set(0, &[1, 2, 3]).is_err());
        assert!(arr.append(&[]).is_err());
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.capacity(), cap);
        assert_eq!(arr.as_bytes(), &before[..]);
    }

    #[test]
    fn test_struct_elements() {
        let mut arr = Array::<Student>::new(2).unwrap();
        arr.append(student(101, "Alice Kim", 95.5)).unwrap();
        arr.append(student(102, "Bob Park", 88.0)).unwrap();
        arr.append(student(103, "Charlie Lee", 92.75)).unwrap();
        arr.append(student(104, "Dana Choi", 97.25)).unwrap();
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.capacity(), 4);
        let got = arr.get(2).unwrap();
        assert_eq!(got.id, 103);
        assert_eq!(&got.name[..11], b"Charlie Lee");
        assert!((got.score - 92.75).abs() < 0.001);
        assert!(arr.get(4).is_none());
    }

    #[test]
    fn test_free_twice() {
        let mut arr = RawArray::new(0, 4).unwrap();
        arr.append(&7i32.to_ne_bytes()).unwrap();
        arr.free();
        assert!(arr.is_freed());
        assert_eq!((arr.len(), arr.capacity()), (0, 0));
        arr.free();
        assert!(arr.get(0).is_none());
        assert!(matches!(
            arr.append(&7i32.to_ne_bytes()),
            Err(MError::InvalidArgument(_))
        ));
        assert!(arr.set(0, &7i32.to_ne_bytes()).is_err());
    }

    #[test]
    fn test_doubling_overflow_leaves_state() {
        let mut arr = RawArray::new(8, 16).unwrap();
        let real_cap = arr.capacity();
        // pretend to be full at a capacity whose doubling overflows the byte count
        arr.cap = 1usize << (usize::BITS - 4);
        arr.len = arr.cap;
        assert!(matches!(
            arr.append(&[0u8; 16]),
            Err(MError::CapacityOverflow)
        ));
        assert_eq!(arr.cap, 1usize << (usize::BITS - 4));

        arr.cap = 1usize << (usize::BITS - 1);
        arr.len = arr.cap;
        assert!(matches!(
            arr.append(&[0u8; 16]),
            Err(MError::CapacityOverflow)
        ));

        arr.cap = real_cap;
        arr.len = 0;
    }

    #[test]
    fn test_typed_drops_elements() {
        use std::rc::Rc;
        let tracker = Rc::new(());
        let mut arr = Array::<Rc<()>>::new(0).unwrap();
        for _ in 0..20 {
            arr.append(Rc::clone(&tracker)).unwrap();
        }
        assert_eq!(Rc::strong_count(&tracker), 21);
        arr.set(0, Rc::new(())).unwrap();
        assert_eq!(Rc::strong_count(&tracker), 20);
        assert!(arr.set(20, Rc::new(())).is_err());
        arr.free();
        assert_eq!(Rc::strong_count(&tracker), 1);
        assert!(arr.append(Rc::clone(&tracker)).is_err());
        assert_eq!(Rc::strong_count(&tracker), 1);
        arr.free();
    }

    #[test]
    fn test_typed_zero_sized_rejected() {
        assert!(Array::<()>::new(4).is_err());
    }

    #[test]
    fn test_typed_iter() {
        let mut arr = Array::<u64>::new(1).unwrap();
        for v in 0..5u64 {
            arr.append(v * v).unwrap();
        }
        assert_eq!(arr.iter().copied().collect::<Vec<_>>(), vec![0, 1, 4, 9, 16]);
        assert_eq!(arr.as_slice(), &[0, 1, 4, 9, 16]);
    }
}
