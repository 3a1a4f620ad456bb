//! Status line output.

use std::io::{ self, Write };


/// Prints one status line per track.
///
/// In raw mode the terminal does not translate `\n`, so lines end in
/// `\r\n` to return the cursor to the first column.
pub struct StatusPrinter<W> {
    out: W,
    raw: bool,
}


impl StatusPrinter<io::Stdout> {
    pub fn stdout( raw: bool ) -> Self {
        Self::new( io::stdout(), raw )
    }
}


impl<W: Write> StatusPrinter<W> {
    pub fn new( out: W, raw: bool ) -> Self {
        Self { out, raw }
    }


    pub fn print( &mut self, status: &str ) {
        let end = if self.raw { "\r\n" } else { "\n" };
        if let Err( e ) = write!( self.out, "{}{}", status, end ).and_then( |_| self.out.flush() ) {
            tracing::warn!( "Failed to print status: {}", e );
        }
    }


    #[cfg( test )]
    fn into_inner( self ) -> W {
        self.out
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_cooked_mode_line() {
        let mut printer = StatusPrinter::new( Vec::new(), false );
        printer.print( "Not available" );
        assert_eq!( printer.into_inner(), b"Not available\n" );
    }


    #[test]
    fn test_raw_mode_line_returns_carriage() {
        let mut printer = StatusPrinter::new( Vec::new(), true );
        printer.print( "Playing: A - B [1:00]" );
        printer.print( "Not available" );
        assert_eq!( printer.into_inner(), b"Playing: A - B [1:00]\r\nNot available\r\n" );
    }
}
