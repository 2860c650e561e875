#[derive(Debug)]
pub struct InvalidPointerError;

pub trait SliceReadExt<T> {
    fn read_u16_le(&self, pointer: &mut usize) -> Result<u16, InvalidPointerError>;
    fn read_u32_le(&self, pointer: &mut usize) -> Result<u32, InvalidPointerError>;
    fn read_tag(&self, pointer: &mut usize) -> Result<[u8; 4], InvalidPointerError>;
    fn read_bytes(&self, pointer: &mut usize, length: usize) -> Result<&[T], InvalidPointerError>;
}

impl SliceReadExt<u8> for &[u8] {
    fn read_u16_le(&self, pointer: &mut usize) -> Result<u16, InvalidPointerError> {
        let bytes: [u8; 2] = self.read_bytes(pointer, 2)?.try_into().map_err(|_| InvalidPointerError)?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn read_u32_le(&self, pointer: &mut usize) -> Result<u32, InvalidPointerError> {
        let bytes: [u8; 4] = self.read_bytes(pointer, 4)?.try_into().map_err(|_| InvalidPointerError)?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn read_tag(&self, pointer: &mut usize) -> Result<[u8; 4], InvalidPointerError> {
        self.read_bytes(pointer, 4)?.try_into().map_err(|_| InvalidPointerError)
    }

    fn read_bytes(&self, pointer: &mut usize, length: usize) -> Result<&[u8], InvalidPointerError> {
        let end = pointer.checked_add(length).ok_or(InvalidPointerError)?;
        let bytes = self.get(*pointer..end).ok_or(InvalidPointerError)?;
        *pointer = end;
        Ok(bytes)
    }
}

pub trait SliceWriteExt {
    fn write_u32_le(&mut self, pointer: &mut usize, value: u32) -> Result<(), InvalidPointerError>;
    fn write_bytes(&mut self, pointer: &mut usize, bytes: &[u8]) -> Result<(), InvalidPointerError>;
}

impl SliceWriteExt for [u8] {
    fn write_u32_le(&mut self, pointer: &mut usize, value: u32) -> Result<(), InvalidPointerError> {
        self.write_bytes(pointer, &value.to_le_bytes())
    }

    fn write_bytes(&mut self, pointer: &mut usize, bytes: &[u8]) -> Result<(), InvalidPointerError> {
        let end = pointer.checked_add(bytes.len()).ok_or(InvalidPointerError)?;
        self.get_mut(*pointer..end).ok_or(InvalidPointerError)?.copy_from_slice(bytes);
        *pointer = end;
        Ok(())
    }
}
