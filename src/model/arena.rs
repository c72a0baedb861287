// 该文件是 Fenjian （分拣） 项目的一部分。
// src/model/arena.rs - 模块内存分配区
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::{debug, warn};

use crate::model::{BufferHandle, ModuleError};

/// 单次分配上限
const ARENA_MAX_ALLOCATION: usize = 16 * 1024 * 1024;

/// 以句柄索引的分配区，释放后的槽位会被复用
#[derive(Debug, Default)]
pub struct Arena {
  slots: Vec<Option<Box<[u8]>>>,
  free: Vec<u32>,
  live: usize,
}

impl Arena {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn allocate(&mut self, len: usize) -> Result<BufferHandle, ModuleError> {
    if len > ARENA_MAX_ALLOCATION {
      warn!("拒绝分配 {} 字节, 超过上限 {}", len, ARENA_MAX_ALLOCATION);
      return Err(ModuleError::OutOfMemory { requested: len });
    }

    let storage = Some(vec![0u8; len].into_boxed_slice());
    let index = match self.free.pop() {
      Some(index) => {
        self.slots[index as usize] = storage;
        index
      }
      None => {
        let index = u32::try_from(self.slots.len())
          .map_err(|_| ModuleError::OutOfMemory { requested: len })?;
        self.slots.push(storage);
        index
      }
    };
    self.live += 1;
    debug!("分配缓冲区 #{}: {} 字节", index, len);
    Ok(BufferHandle(index))
  }

  pub fn write(&mut self, handle: BufferHandle, bytes: &[u8]) -> Result<(), ModuleError> {
    let slot = self
      .slots
      .get_mut(handle.0 as usize)
      .and_then(Option::as_mut)
      .ok_or(ModuleError::UnknownHandle(handle))?;
    if bytes.len() > slot.len() {
      return Err(ModuleError::Overflow {
        capacity: slot.len(),
        len: bytes.len(),
      });
    }
    slot[..bytes.len()].copy_from_slice(bytes);
    Ok(())
  }

  pub fn get(&self, handle: BufferHandle) -> Option<&[u8]> {
    self.slots.get(handle.0 as usize)?.as_deref()
  }

  /// 释放句柄，返回该句柄此前是否存活
  pub fn release(&mut self, handle: BufferHandle) -> bool {
    let Some(slot) = self.slots.get_mut(handle.0 as usize) else {
      return false;
    };
    if slot.take().is_none() {
      return false;
    }
    self.free.push(handle.0);
    self.live -= 1;
    debug!("释放缓冲区 {}", handle);
    true
  }

  /// 尚未释放的缓冲区数量
  pub fn live(&self) -> usize {
    self.live
  }

  /// 曾经分配过的槽位总数
  pub fn slot_count(&self) -> usize {
    self.slots.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn released_slots_are_reused() {
    let mut arena = Arena::new();
    for _ in 0..100 {
      let handle = arena.allocate(64).unwrap();
      arena.write(handle, &[7; 64]).unwrap();
      assert!(arena.release(handle));
    }
    assert_eq!(arena.live(), 0);
    assert_eq!(arena.slot_count(), 1);
  }

  #[test]
  fn double_release_is_a_no_op() {
    let mut arena = Arena::new();
    let handle = arena.allocate(4).unwrap();
    assert!(arena.release(handle));
    assert!(!arena.release(handle));
    assert_eq!(arena.live(), 0);
  }

  #[test]
  fn write_checks_handle_and_capacity() {
    let mut arena = Arena::new();
    let handle = arena.allocate(2).unwrap();
    assert_eq!(
      arena.write(handle, &[1, 2, 3]),
      Err(ModuleError::Overflow {
        capacity: 2,
        len: 3
      })
    );
    arena.write(handle, &[1, 2]).unwrap();
    assert_eq!(arena.get(handle), Some(&[1u8, 2][..]));

    arena.release(handle);
    assert_eq!(
      arena.write(handle, &[1]),
      Err(ModuleError::UnknownHandle(handle))
    );
    assert_eq!(arena.get(handle), None);
  }

  #[test]
  fn oversized_allocation_fails() {
    let mut arena = Arena::new();
    assert!(matches!(
      arena.allocate(ARENA_MAX_ALLOCATION + 1),
      Err(ModuleError::OutOfMemory { .. })
    ));
    assert_eq!(arena.live(), 0);
  }
}
